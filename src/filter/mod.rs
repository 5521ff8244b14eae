//! Test selection filters
//!
//! Filters prune the tree while work items are created. A node passes when it
//! matches itself or one of its descendants matches. Once a suite matches by
//! itself, its subtree runs under the exclusions of the filter alone, so an
//! excluded test below a selected suite still stays out of the run.

use std::fmt;
use std::sync::Arc;

use crate::models::TestNode;

/// Selects which tests of a tree take part in a run
pub trait TestFilter: Send + Sync + fmt::Debug {
    /// Whether the node matches on its own merits
    fn matches(&self, test: &TestNode) -> bool;

    /// Whether the node takes part in the run
    fn pass(&self, test: &TestNode) -> bool {
        self.matches(test) || test.children().iter().any(|c| self.pass(c))
    }

    /// Whether the node, or something below it, was named explicitly
    fn is_explicit_match(&self, test: &TestNode) -> bool {
        self.matches(test) || test.children().iter().any(|c| self.is_explicit_match(c))
    }

    fn is_empty(&self) -> bool {
        false
    }

    /// Whether the negative part of the filter rules the node out
    fn excludes(&self, _test: &TestNode) -> bool {
        false
    }

    fn has_exclusions(&self) -> bool {
        false
    }

    /// Whether nothing but exclusions is left in the filter
    fn only_excludes(&self) -> bool {
        false
    }
}

/// Passes everything, never an explicit match
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyFilter;

impl TestFilter for EmptyFilter {
    fn matches(&self, _test: &TestNode) -> bool {
        true
    }

    fn pass(&self, _test: &TestNode) -> bool {
        true
    }

    fn is_explicit_match(&self, _test: &TestNode) -> bool {
        false
    }

    fn is_empty(&self) -> bool {
        true
    }
}

/// Matches nodes by id
#[derive(Clone, Debug)]
pub struct IdFilter {
    ids: Vec<String>,
}

impl IdFilter {
    pub fn new(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

impl TestFilter for IdFilter {
    fn matches(&self, test: &TestNode) -> bool {
        self.ids.iter().any(|id| id == test.id())
    }
}

/// Matches nodes by exact full name
#[derive(Clone, Debug)]
pub struct FullNameFilter {
    names: Vec<String>,
}

impl FullNameFilter {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl TestFilter for FullNameFilter {
    fn matches(&self, test: &TestNode) -> bool {
        self.names.iter().any(|n| n == test.full_name())
    }
}

/// Matches nodes whose full name contains a substring
#[derive(Clone, Debug)]
pub struct NameContainsFilter {
    pattern: String,
}

impl NameContainsFilter {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

impl TestFilter for NameContainsFilter {
    fn matches(&self, test: &TestNode) -> bool {
        test.full_name().contains(&self.pattern)
    }
}

/// Matches nodes carrying any of the categories
#[derive(Clone, Debug)]
pub struct CategoryFilter {
    categories: Vec<String>,
}

impl CategoryFilter {
    pub fn new(categories: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
        }
    }
}

impl TestFilter for CategoryFilter {
    fn matches(&self, test: &TestNode) -> bool {
        test.categories()
            .iter()
            .any(|c| self.categories.iter().any(|wanted| wanted == c))
    }
}

/// Inverts another filter
#[derive(Debug)]
pub struct NotFilter {
    inner: Box<dyn TestFilter>,
}

impl NotFilter {
    pub fn new(inner: Box<dyn TestFilter>) -> Self {
        Self { inner }
    }
}

impl TestFilter for NotFilter {
    fn matches(&self, test: &TestNode) -> bool {
        !self.inner.matches(test)
    }

    /// Excluding a suite excludes everything below it
    fn pass(&self, test: &TestNode) -> bool {
        if self.inner.matches(test) {
            return false;
        }
        !test.is_suite()
            || !test.has_children()
            || test.children().iter().any(|c| self.pass(c))
    }

    fn is_explicit_match(&self, _test: &TestNode) -> bool {
        false
    }

    fn excludes(&self, test: &TestNode) -> bool {
        self.inner.matches(test)
    }

    fn has_exclusions(&self) -> bool {
        true
    }
}

/// Matches when every inner filter matches
#[derive(Debug)]
pub struct AndFilter {
    filters: Vec<Box<dyn TestFilter>>,
}

impl AndFilter {
    pub fn new(filters: Vec<Box<dyn TestFilter>>) -> Self {
        Self { filters }
    }
}

impl TestFilter for AndFilter {
    fn matches(&self, test: &TestNode) -> bool {
        self.filters.iter().all(|f| f.matches(test))
    }

    fn pass(&self, test: &TestNode) -> bool {
        self.filters.iter().all(|f| f.pass(test))
            && (self.matches(test) || test.children().iter().any(|c| self.pass(c)))
    }

    fn is_explicit_match(&self, test: &TestNode) -> bool {
        self.filters.iter().all(|f| f.is_explicit_match(test))
    }

    fn excludes(&self, test: &TestNode) -> bool {
        self.filters.iter().any(|f| f.excludes(test))
    }

    fn has_exclusions(&self) -> bool {
        self.filters.iter().any(|f| f.has_exclusions())
    }
}

/// Matches when any inner filter matches
#[derive(Debug)]
pub struct OrFilter {
    filters: Vec<Box<dyn TestFilter>>,
}

impl OrFilter {
    pub fn new(filters: Vec<Box<dyn TestFilter>>) -> Self {
        Self { filters }
    }
}

impl TestFilter for OrFilter {
    fn matches(&self, test: &TestNode) -> bool {
        self.filters.iter().any(|f| f.matches(test))
    }

    fn pass(&self, test: &TestNode) -> bool {
        self.filters.iter().any(|f| f.pass(test))
    }

    fn is_explicit_match(&self, test: &TestNode) -> bool {
        self.filters.iter().any(|f| f.is_explicit_match(test))
    }

    /// A positive branch keeps the node in
    fn excludes(&self, test: &TestNode) -> bool {
        self.filters.iter().all(|f| f.excludes(test))
    }

    fn has_exclusions(&self) -> bool {
        self.filters.iter().all(|f| f.has_exclusions())
    }
}

/// Keeps only the exclusions of a filter, for the subtree of a matched suite
#[derive(Debug)]
pub struct ExclusionFilter {
    inner: Arc<dyn TestFilter>,
}

impl ExclusionFilter {
    pub fn new(inner: Arc<dyn TestFilter>) -> Self {
        Self { inner }
    }
}

impl TestFilter for ExclusionFilter {
    fn matches(&self, test: &TestNode) -> bool {
        !self.inner.excludes(test)
    }

    fn pass(&self, test: &TestNode) -> bool {
        if self.inner.excludes(test) {
            return false;
        }
        !test.is_suite()
            || !test.has_children()
            || test.children().iter().any(|c| self.pass(c))
    }

    fn is_explicit_match(&self, _test: &TestNode) -> bool {
        false
    }

    fn excludes(&self, test: &TestNode) -> bool {
        self.inner.excludes(test)
    }

    fn has_exclusions(&self) -> bool {
        true
    }

    fn only_excludes(&self) -> bool {
        true
    }
}

/// Filter for the children of a suite that matched `filter` by itself
pub fn subtree_filter(filter: &Arc<dyn TestFilter>) -> Arc<dyn TestFilter> {
    if filter.only_excludes() {
        Arc::clone(filter)
    } else if filter.has_exclusions() {
        Arc::new(ExclusionFilter::new(Arc::clone(filter)))
    } else {
        Arc::new(EmptyFilter)
    }
}

/// Command-line style selection, combined into one filter
#[derive(Clone, Debug, Default)]
pub struct Selection {
    pub ids: Vec<String>,
    pub full_names: Vec<String>,
    pub contains: Vec<String>,
    pub categories: Vec<String>,
    pub exclude_categories: Vec<String>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
            && self.full_names.is_empty()
            && self.contains.is_empty()
            && self.categories.is_empty()
            && self.exclude_categories.is_empty()
    }

    /// Name-like criteria are or'ed, categories and exclusions are and'ed on top
    pub fn into_filter(self) -> Box<dyn TestFilter> {
        if self.is_empty() {
            return Box::new(EmptyFilter);
        }

        let mut named: Vec<Box<dyn TestFilter>> = Vec::new();
        if !self.ids.is_empty() {
            named.push(Box::new(IdFilter::new(self.ids)));
        }
        if !self.full_names.is_empty() {
            named.push(Box::new(FullNameFilter::new(self.full_names)));
        }
        for pattern in self.contains {
            named.push(Box::new(NameContainsFilter::new(pattern)));
        }

        let mut required: Vec<Box<dyn TestFilter>> = Vec::new();
        match named.len() {
            0 => {}
            1 => required.extend(named),
            _ => required.push(Box::new(OrFilter::new(named))),
        }
        if !self.categories.is_empty() {
            required.push(Box::new(CategoryFilter::new(self.categories)));
        }
        if !self.exclude_categories.is_empty() {
            required.push(Box::new(NotFilter::new(Box::new(CategoryFilter::new(
                self.exclude_categories,
            )))));
        }

        if required.len() == 1 {
            required.remove(0)
        } else {
            Box::new(AndFilter::new(required))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TestBuilder;

    fn tree() -> Arc<TestNode> {
        TestBuilder::suite("Root")
            .child(
                TestBuilder::fixture("Math")
                    .category("Fast")
                    .child(TestBuilder::case("Add", |_| Ok(())))
                    .child(TestBuilder::case("Div", |_| Ok(())).category("Slow")),
            )
            .child(
                TestBuilder::fixture("Io")
                    .child(TestBuilder::case("Read", |_| Ok(())).explicit("touches disk")),
            )
            .build()
    }

    #[test]
    fn test_empty_filter_passes_everything() {
        let root = tree();
        assert!(EmptyFilter.pass(&root));
        assert!(EmptyFilter.is_empty());
        assert!(!EmptyFilter.is_explicit_match(&root.children()[1].children()[0]));
    }

    #[test]
    fn test_descendant_match_passes_ancestors() {
        let root = tree();
        let filter = FullNameFilter::new(["Root.Io.Read"]);

        assert!(filter.pass(&root));
        assert!(!filter.matches(&root));
        assert!(filter.pass(&root.children()[1]));
        assert!(!filter.pass(&root.children()[0]));
        assert!(filter.is_explicit_match(&root.children()[1].children()[0]));
    }

    #[test]
    fn test_category_filter() {
        let root = tree();
        let filter = CategoryFilter::new(["Slow"]);
        let math = &root.children()[0];

        assert!(filter.pass(math));
        assert!(!filter.pass(&math.children()[0]));
        assert!(filter.pass(&math.children()[1]));
        assert!(!filter.pass(&root.children()[1]));
    }

    #[test]
    fn test_not_filter_excludes_subtree() {
        let root = tree();
        let filter = NotFilter::new(Box::new(CategoryFilter::new(["Fast"])));

        assert!(!filter.pass(&root.children()[0]));
        assert!(filter.pass(&root.children()[1]));
        assert!(filter.pass(&root));
        assert!(!filter.is_explicit_match(&root.children()[1].children()[0]));
    }

    #[test]
    fn test_id_filter() {
        let root = tree();
        let filter = IdFilter::new(["0-1002"]);
        assert!(filter.matches(&root.children()[0].children()[0]));
        assert!(filter.pass(&root));
    }

    #[test]
    fn test_selection_combines() {
        let root = tree();
        let filter = Selection {
            contains: vec!["Math".into()],
            exclude_categories: vec!["Slow".into()],
            ..Default::default()
        }
        .into_filter();

        let math = &root.children()[0];
        assert!(filter.pass(&math.children()[0]));
        assert!(!filter.pass(&math.children()[1]));
        assert!(!filter.pass(&root.children()[1]));
    }

    #[test]
    fn test_subtree_filter_keeps_exclusions() {
        let root = tree();
        let math = &root.children()[0];
        let filter: Arc<dyn TestFilter> = Arc::from(
            Selection {
                categories: vec!["Fast".into()],
                exclude_categories: vec!["Slow".into()],
                ..Default::default()
            }
            .into_filter(),
        );

        assert!(filter.matches(math));
        let below = subtree_filter(&filter);
        assert!(below.pass(&math.children()[0]));
        assert!(!below.pass(&math.children()[1]));
        assert!(!below.is_explicit_match(&math.children()[0]));

        let again = subtree_filter(&below);
        assert!(again.only_excludes());
        assert!(!again.pass(&math.children()[1]));
    }

    #[test]
    fn test_subtree_filter_of_positive_filter_is_empty() {
        let filter: Arc<dyn TestFilter> = Arc::new(CategoryFilter::new(["Fast"]));
        assert!(subtree_filter(&filter).is_empty());

        let either: Arc<dyn TestFilter> = Arc::new(OrFilter::new(vec![
            Box::new(FullNameFilter::new(["Root.Math"])),
            Box::new(NotFilter::new(Box::new(CategoryFilter::new(["Slow"])))),
        ]));
        assert!(subtree_filter(&either).is_empty());
    }

    #[test]
    fn test_empty_selection_is_empty_filter() {
        assert!(Selection::default().into_filter().is_empty());
    }
}
