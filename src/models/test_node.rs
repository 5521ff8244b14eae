//! Test tree nodes
//!
//! A `TestNode` describes a single test case or a suite of tests. Nodes are
//! built once through [`TestBuilder`] and shared immutably afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::execution::{ExecutionContext, WorkItem};
use crate::filter::TestFilter;

use super::failure::TestFailure;
use super::test_result::TestResult;

/// Well-known property names
pub mod property_names {
    pub const SKIP_REASON: &str = "_SKIPREASON";
    pub const PROVIDER_STACK_TRACE: &str = "_PROVIDERSTACKTRACE";
    pub const CATEGORY: &str = "Category";
    pub const DESCRIPTION: &str = "Description";
    pub const TIMEOUT: &str = "Timeout";
    pub const APARTMENT_STATE: &str = "ApartmentState";
    pub const SET_CULTURE: &str = "SetCulture";
    pub const PARALLEL_SCOPE: &str = "ParallelScope";
}

/// `ParallelScope` value of a test that must not run alongside others
pub const PARALLEL_SCOPE_NONE: &str = "None";

/// Test type reported for leaf tests
pub const TEST_CASE_TYPE: &str = "TestCase";

/// Body of a test or a fixture hook
pub type TestFn = Arc<dyn Fn(&ExecutionContext) -> Result<(), TestFailure> + Send + Sync>;

/// Whether and how a test may be run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunState {
    Runnable,
    Skipped,
    Ignored,
    Explicit,
    NotRunnable,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Runnable => "Runnable",
            RunState::Skipped => "Skipped",
            RunState::Ignored => "Ignored",
            RunState::Explicit => "Explicit",
            RunState::NotRunnable => "NotRunnable",
        };
        f.write_str(name)
    }
}

/// Threading model a test asks for
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ApartmentState {
    #[default]
    Unknown,
    Sta,
    Mta,
}

impl ApartmentState {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "STA" => Some(ApartmentState::Sta),
            "MTA" => Some(ApartmentState::Mta),
            "UNKNOWN" => Some(ApartmentState::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for ApartmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApartmentState::Unknown => write!(f, "Unknown"),
            ApartmentState::Sta => write!(f, "STA"),
            ApartmentState::Mta => write!(f, "MTA"),
        }
    }
}

/// String keyed property bag holding ordered values
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertyBag {
    entries: BTreeMap<String, Vec<String>>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value under the key
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.entry(key.into()).or_default().push(value.into());
    }

    /// Replaces all values under the key
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), vec![value.into()]);
    }

    /// First value stored under the key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One-time and per-test hooks attached to a fixture.
///
/// Lists are ordered base-first. Setup hooks run in list order, teardown
/// hooks run in reverse list order.
#[derive(Clone, Default)]
pub struct FixtureHooks {
    pub one_time_setup: Vec<TestFn>,
    pub one_time_teardown: Vec<TestFn>,
    pub setup: Vec<TestFn>,
    pub teardown: Vec<TestFn>,
    pub dispose: Option<TestFn>,
}

impl FixtureHooks {
    pub fn is_empty(&self) -> bool {
        self.one_time_setup.is_empty()
            && self.one_time_teardown.is_empty()
            && self.setup.is_empty()
            && self.teardown.is_empty()
            && self.dispose.is_none()
    }

    /// Whether the fixture provides per-test hooks for its cases
    pub fn has_per_test_hooks(&self) -> bool {
        !self.setup.is_empty() || !self.teardown.is_empty()
    }
}

impl fmt::Debug for FixtureHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixtureHooks")
            .field("one_time_setup", &self.one_time_setup.len())
            .field("one_time_teardown", &self.one_time_teardown.len())
            .field("setup", &self.setup.len())
            .field("teardown", &self.teardown.len())
            .field("dispose", &self.dispose.is_some())
            .finish()
    }
}

enum NodeKind {
    Case {
        body: TestFn,
    },
    Suite {
        children: Vec<Arc<TestNode>>,
        hooks: Arc<FixtureHooks>,
    },
}

/// A test case or suite in the test tree
pub struct TestNode {
    id: String,
    name: String,
    full_name: String,
    test_type: String,
    run_state: RunState,
    properties: PropertyBag,
    requires_thread: bool,
    is_async: bool,
    /// Own `ParallelScope` of None, or inherited from an ancestor
    non_parallelizable: bool,
    kind: NodeKind,
}

impl TestNode {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Kind of node as reported ("TestCase", "TestFixture", "TestSuite", ...)
    pub fn test_type(&self) -> &str {
        &self.test_type
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    pub fn requires_thread(&self) -> bool {
        self.requires_thread
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn is_non_parallelizable(&self) -> bool {
        self.non_parallelizable
    }

    pub fn is_suite(&self) -> bool {
        matches!(self.kind, NodeKind::Suite { .. })
    }

    pub fn children(&self) -> &[Arc<TestNode>] {
        match &self.kind {
            NodeKind::Suite { children, .. } => children,
            NodeKind::Case { .. } => &[],
        }
    }

    pub fn has_children(&self) -> bool {
        !self.children().is_empty()
    }

    pub fn body(&self) -> Option<&TestFn> {
        match &self.kind {
            NodeKind::Case { body } => Some(body),
            NodeKind::Suite { .. } => None,
        }
    }

    pub fn hooks(&self) -> Option<&Arc<FixtureHooks>> {
        match &self.kind {
            NodeKind::Suite { hooks, .. } => Some(hooks),
            NodeKind::Case { .. } => None,
        }
    }

    /// Number of test cases at or below this node
    pub fn test_case_count(&self) -> usize {
        match &self.kind {
            NodeKind::Case { .. } => 1,
            NodeKind::Suite { children, .. } => {
                children.iter().map(|c| c.test_case_count()).sum()
            }
        }
    }

    pub fn categories(&self) -> &[String] {
        self.properties.get_all(property_names::CATEGORY)
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.properties.get(property_names::SKIP_REASON)
    }

    pub fn provider_stack_trace(&self) -> Option<&str> {
        self.properties.get(property_names::PROVIDER_STACK_TRACE)
    }

    /// Timeout override from the property bag; zero means none
    pub fn timeout(&self) -> Option<Duration> {
        self.properties
            .get(property_names::TIMEOUT)
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn apartment(&self) -> ApartmentState {
        self.properties
            .get(property_names::APARTMENT_STATE)
            .and_then(ApartmentState::from_str)
            .unwrap_or_default()
    }

    pub fn culture(&self) -> Option<&str> {
        self.properties.get(property_names::SET_CULTURE)
    }

    /// Fresh, not yet run result for this node
    pub fn make_test_result(self: &Arc<Self>) -> TestResult {
        TestResult::new(Arc::clone(self))
    }

    /// Fresh work item executing this node, pruned by `filter`
    pub fn make_work_item(self: &Arc<Self>, filter: Arc<dyn TestFilter>) -> WorkItem {
        WorkItem::create(Arc::clone(self), filter)
    }

    /// Depth-first search by id
    pub fn find(self: &Arc<Self>, id: &str) -> Option<Arc<TestNode>> {
        if self.id == id {
            return Some(Arc::clone(self));
        }
        self.children().iter().find_map(|c| c.find(id))
    }
}

impl fmt::Debug for TestNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestNode")
            .field("id", &self.id)
            .field("full_name", &self.full_name)
            .field("test_type", &self.test_type)
            .field("run_state", &self.run_state)
            .field("children", &self.children().len())
            .finish()
    }
}

impl fmt::Display for TestNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name)
    }
}

enum BuilderKind {
    Case(TestFn),
    Suite {
        children: Vec<TestBuilder>,
        hooks: FixtureHooks,
    },
}

/// Builds a test tree, assigning ids and full names on `build`
pub struct TestBuilder {
    name: String,
    test_type: String,
    run_state: RunState,
    properties: PropertyBag,
    requires_thread: bool,
    is_async: bool,
    kind: BuilderKind,
}

impl TestBuilder {
    fn with_kind(name: impl Into<String>, test_type: &str, kind: BuilderKind) -> Self {
        Self {
            name: name.into(),
            test_type: test_type.to_string(),
            run_state: RunState::Runnable,
            properties: PropertyBag::new(),
            requires_thread: false,
            is_async: false,
            kind,
        }
    }

    /// Plain grouping suite (namespace, assembly)
    pub fn suite(name: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            "TestSuite",
            BuilderKind::Suite {
                children: Vec::new(),
                hooks: FixtureHooks::default(),
            },
        )
    }

    /// Fixture suite, usually carrying hooks
    pub fn fixture(name: impl Into<String>) -> Self {
        let mut builder = Self::suite(name);
        builder.test_type = "TestFixture".to_string();
        builder
    }

    pub fn case<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Result<(), TestFailure> + Send + Sync + 'static,
    {
        Self::with_kind(name, TEST_CASE_TYPE, BuilderKind::Case(Arc::new(body)))
    }

    pub fn test_type(mut self, test_type: impl Into<String>) -> Self {
        self.test_type = test_type.into();
        self
    }

    /// Adds a child; ignored for test cases
    pub fn child(mut self, child: TestBuilder) -> Self {
        if let BuilderKind::Suite { children, .. } = &mut self.kind {
            children.push(child);
        }
        self
    }

    pub fn children(mut self, new_children: impl IntoIterator<Item = TestBuilder>) -> Self {
        if let BuilderKind::Suite { children, .. } = &mut self.kind {
            children.extend(new_children);
        }
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.add(key, value);
        self
    }

    pub fn category(self, category: impl Into<String>) -> Self {
        self.property(property_names::CATEGORY, category)
    }

    pub fn description(self, description: impl Into<String>) -> Self {
        self.property(property_names::DESCRIPTION, description)
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.properties.set(property_names::TIMEOUT, ms.to_string());
        self
    }

    pub fn apartment(mut self, apartment: ApartmentState) -> Self {
        self.properties
            .set(property_names::APARTMENT_STATE, apartment.to_string());
        self
    }

    pub fn culture(mut self, culture: impl Into<String>) -> Self {
        self.properties.set(property_names::SET_CULTURE, culture);
        self
    }

    pub fn requires_thread(mut self) -> Self {
        self.requires_thread = true;
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    /// Never runs alongside other tests; applies to everything below a suite
    pub fn non_parallelizable(mut self) -> Self {
        self.properties
            .set(property_names::PARALLEL_SCOPE, PARALLEL_SCOPE_NONE);
        self
    }

    fn with_run_state(mut self, run_state: RunState, reason: impl Into<String>) -> Self {
        self.run_state = run_state;
        let reason = reason.into();
        if !reason.is_empty() {
            self.properties.set(property_names::SKIP_REASON, reason);
        }
        self
    }

    pub fn skip(self, reason: impl Into<String>) -> Self {
        self.with_run_state(RunState::Skipped, reason)
    }

    pub fn ignore(self, reason: impl Into<String>) -> Self {
        self.with_run_state(RunState::Ignored, reason)
    }

    pub fn explicit(self, reason: impl Into<String>) -> Self {
        self.with_run_state(RunState::Explicit, reason)
    }

    /// Marks the node invalid, recording why. Not runnable is final.
    pub fn not_runnable(self, reason: impl Into<String>) -> Self {
        self.with_run_state(RunState::NotRunnable, reason)
    }

    /// Records where an invalid node was produced
    pub fn provider_stack_trace(mut self, trace: impl Into<String>) -> Self {
        self.properties
            .set(property_names::PROVIDER_STACK_TRACE, trace);
        self
    }

    fn hooks_mut(&mut self) -> Option<&mut FixtureHooks> {
        match &mut self.kind {
            BuilderKind::Suite { hooks, .. } => Some(hooks),
            BuilderKind::Case(_) => None,
        }
    }

    pub fn one_time_setup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Result<(), TestFailure> + Send + Sync + 'static,
    {
        if let Some(hooks) = self.hooks_mut() {
            hooks.one_time_setup.push(Arc::new(hook));
        }
        self
    }

    pub fn one_time_teardown<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Result<(), TestFailure> + Send + Sync + 'static,
    {
        if let Some(hooks) = self.hooks_mut() {
            hooks.one_time_teardown.push(Arc::new(hook));
        }
        self
    }

    pub fn setup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Result<(), TestFailure> + Send + Sync + 'static,
    {
        if let Some(hooks) = self.hooks_mut() {
            hooks.setup.push(Arc::new(hook));
        }
        self
    }

    pub fn teardown<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Result<(), TestFailure> + Send + Sync + 'static,
    {
        if let Some(hooks) = self.hooks_mut() {
            hooks.teardown.push(Arc::new(hook));
        }
        self
    }

    pub fn dispose<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Result<(), TestFailure> + Send + Sync + 'static,
    {
        if let Some(hooks) = self.hooks_mut() {
            hooks.dispose = Some(Arc::new(hook));
        }
        self
    }

    /// Freezes the tree. Ids are `0-1000`, `0-1001`, ... in depth-first order.
    pub fn build(self) -> Arc<TestNode> {
        self.build_with_prefix(0)
    }

    /// Freezes the tree with ids `{prefix}-1000`, `{prefix}-1001`, ..., so
    /// trees built with different prefixes never share an id
    pub fn build_with_prefix(self, prefix: usize) -> Arc<TestNode> {
        let mut next_id = 1000;
        self.build_node(None, false, prefix, &mut next_id)
    }

    fn build_node(
        self,
        parent_full_name: Option<&str>,
        parent_non_parallelizable: bool,
        prefix: usize,
        next_id: &mut u64,
    ) -> Arc<TestNode> {
        let id = format!("{prefix}-{next_id}");
        *next_id += 1;

        let non_parallelizable = parent_non_parallelizable
            || self.properties.get(property_names::PARALLEL_SCOPE) == Some(PARALLEL_SCOPE_NONE);

        let full_name = match parent_full_name {
            Some(parent) => format!("{parent}.{}", self.name),
            None => self.name.clone(),
        };

        let kind = match self.kind {
            BuilderKind::Case(body) => NodeKind::Case { body },
            BuilderKind::Suite { children, hooks } => NodeKind::Suite {
                children: children
                    .into_iter()
                    .map(|c| c.build_node(Some(&full_name), non_parallelizable, prefix, next_id))
                    .collect(),
                hooks: Arc::new(hooks),
            },
        };

        Arc::new(TestNode {
            id,
            name: self.name,
            full_name,
            test_type: self.test_type,
            run_state: self.run_state,
            properties: self.properties,
            requires_thread: self.requires_thread,
            is_async: self.is_async,
            non_parallelizable,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass() -> impl Fn(&ExecutionContext) -> Result<(), TestFailure> + Send + Sync + 'static {
        |_| Ok(())
    }

    #[test]
    fn test_build_assigns_ids_and_full_names() {
        let root = TestBuilder::suite("Assembly")
            .child(
                TestBuilder::fixture("MathTests")
                    .child(TestBuilder::case("Add", pass()))
                    .child(TestBuilder::case("Sub", pass())),
            )
            .child(TestBuilder::case("Loose", pass()))
            .build();

        assert_eq!(root.id(), "0-1000");
        assert!(root.is_suite());
        assert_eq!(root.children().len(), 2);

        let fixture = &root.children()[0];
        assert_eq!(fixture.id(), "0-1001");
        assert_eq!(fixture.test_type(), "TestFixture");
        assert_eq!(fixture.children()[1].full_name(), "Assembly.MathTests.Sub");
        assert_eq!(fixture.children()[1].id(), "0-1003");
        assert_eq!(root.children()[1].id(), "0-1004");
        assert_eq!(root.test_case_count(), 3);
    }

    #[test]
    fn test_properties() {
        let node = TestBuilder::case("Slow", pass())
            .category("Slow")
            .category("Database")
            .timeout_ms(250)
            .apartment(ApartmentState::Sta)
            .build();

        assert_eq!(node.categories(), ["Slow".to_string(), "Database".to_string()]);
        assert_eq!(node.timeout(), Some(Duration::from_millis(250)));
        assert_eq!(node.apartment(), ApartmentState::Sta);
        assert!(!node.is_suite());
        assert!(node.body().is_some());
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let node = TestBuilder::case("NoLimit", pass()).timeout_ms(0).build();
        assert_eq!(node.timeout(), None);
    }

    #[test]
    fn test_run_state_records_reason() {
        let node = TestBuilder::fixture("Broken")
            .not_runnable("No suitable constructor was found")
            .provider_stack_trace("at builder.rs:42")
            .build();

        assert_eq!(node.run_state(), RunState::NotRunnable);
        assert_eq!(node.skip_reason(), Some("No suitable constructor was found"));
        assert_eq!(node.provider_stack_trace(), Some("at builder.rs:42"));
    }

    #[test]
    fn test_empty_suite_is_still_a_suite() {
        let node = TestBuilder::suite("Empty").build();
        assert!(node.is_suite());
        assert!(!node.has_children());
        assert_eq!(node.test_case_count(), 0);
    }

    #[test]
    fn test_prefix_separates_ids() {
        let first = TestBuilder::suite("A")
            .child(TestBuilder::case("B", pass()))
            .build_with_prefix(0);
        let second = TestBuilder::suite("A")
            .child(TestBuilder::case("B", pass()))
            .build_with_prefix(1);

        assert_eq!(first.children()[0].id(), "0-1001");
        assert_eq!(second.id(), "1-1000");
        assert_eq!(second.children()[0].id(), "1-1001");
        assert!(first.find("1-1001").is_none());
    }

    #[test]
    fn test_non_parallelizable_is_inherited() {
        let root = TestBuilder::suite("Root")
            .child(
                TestBuilder::fixture("Serial")
                    .non_parallelizable()
                    .child(TestBuilder::case("A", pass())),
            )
            .child(TestBuilder::fixture("Free").child(TestBuilder::case("B", pass())))
            .build();

        let serial = &root.children()[0];
        assert!(!root.is_non_parallelizable());
        assert!(serial.is_non_parallelizable());
        assert_eq!(serial.properties().get(property_names::PARALLEL_SCOPE), Some("None"));
        assert!(serial.children()[0].is_non_parallelizable());
        assert!(!root.children()[1].children()[0].is_non_parallelizable());
    }

    #[test]
    fn test_find_by_id() {
        let root = TestBuilder::suite("A")
            .child(TestBuilder::case("B", pass()))
            .build();
        assert_eq!(root.find("0-1001").map(|n| n.name().to_string()), Some("B".into()));
        assert!(root.find("0-9999").is_none());
    }
}
