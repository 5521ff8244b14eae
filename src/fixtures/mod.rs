//! Test discovery from suite files

pub mod script;

pub use script::{
    load_suite, load_suite_numbered, CaseScript, HookScript, Outcome, ScriptError, SuiteScript,
};

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::models::TestNode;

/// Loads one root suite per file, in the order given. The n-th file's ids
/// start with `n-`.
pub fn discover(paths: &[PathBuf]) -> Result<Vec<Arc<TestNode>>> {
    paths
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let root = load_suite_numbered(path, index)
                .with_context(|| format!("Loading suite file {}", path.display()))?;
            debug!(
                "Loaded {} ({} test cases) from {}",
                root.full_name(),
                root.test_case_count(),
                path.display()
            );
            Ok(root)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    const SUITE: &str = r#"
name: Root
suites:
  - name: Math
    cases:
      - name: Add
      - name: Div
        outcome: fail
"#;

    fn collect_ids(node: &Arc<TestNode>, ids: &mut Vec<String>) {
        ids.push(node.id().to_string());
        for child in node.children() {
            collect_ids(child, ids);
        }
    }

    #[test]
    fn test_ids_are_unique_across_files() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first.yaml");
        let second = dir.path().join("second.yaml");
        std::fs::write(&first, SUITE).unwrap();
        std::fs::write(&second, SUITE).unwrap();

        let roots = discover(&[first, second]).unwrap();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].id(), "0-1000");
        assert_eq!(roots[1].id(), "1-1000");

        let mut ids = Vec::new();
        for root in &roots {
            collect_ids(root, &mut ids);
        }
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(ids.len(), 8);
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let err = discover(&[PathBuf::from("does/not/exist.yaml")]).unwrap_err();
        assert!(format!("{err:#}").contains("does/not/exist.yaml"));
    }
}
