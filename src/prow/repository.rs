use indexmap::IndexMap;

/// Per-repository flags collected while generating presubmit jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRecord {
    /// Full `org/repo` name
    pub name: String,
    pub enable_performance_tests: bool,
    pub enable_go_coverage: bool,
    pub go_coverage_threshold: i64,
    /// Set once a periodic job was emitted for the repository
    pub processed: bool,
}

impl RepositoryRecord {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enable_performance_tests: false,
            enable_go_coverage: false,
            go_coverage_threshold: DEFAULT_GO_COVERAGE_THRESHOLD,
            processed: false,
        }
    }
}

pub const DEFAULT_GO_COVERAGE_THRESHOLD: i64 = 50;

/// Repository records keyed by `org/repo`, in the order they were first seen.
#[derive(Debug, Default)]
pub struct RepositoryRegistry {
    records: IndexMap<String, RepositoryRecord>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `name`, creating it on first use.
    pub fn entry(&mut self, name: &str) -> &mut RepositoryRecord {
        self.records
            .entry(name.to_string())
            .or_insert_with(|| RepositoryRecord::new(name))
    }

    pub fn get(&self, name: &str) -> Option<&RepositoryRecord> {
        self.records.get(name)
    }

    pub fn mark_processed(&mut self, name: &str) {
        if let Some(record) = self.records.get_mut(name) {
            record.processed = true;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RepositoryRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
