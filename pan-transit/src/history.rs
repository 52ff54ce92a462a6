//! Search query history.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::persist::{self, PersistError};

/// Most queries kept on disk.
const MAX_QUERIES: usize = 1000;

/// Past stop search queries, most recent first.
#[derive(Debug, Clone)]
pub struct History {
    queries: Vec<String>,
    path: PathBuf,
}

impl History {
    /// Empty history persisted at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            queries: Vec::new(),
            path: path.into(),
        }
    }

    /// History read from `path`; missing or unreadable files give an empty
    /// history.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let mut history = Self::new(path);
        match persist::read_json::<Vec<String>>(&history.path) {
            Ok(queries) => {
                debug!(count = queries.len(), "Loaded search history");
                history.queries = queries;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(error = %e, "Failed to load search history"),
        }
        history
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `query` as the most recent. Blank queries are ignored and
    /// earlier copies differing only in case are dropped.
    pub fn add(&mut self, query: &str) {
        let query = query.trim();
        if query.is_empty() {
            return;
        }
        self.remove(query);
        self.queries.insert(0, query.to_string());
    }

    /// Forget `query`, ignoring case and surrounding whitespace.
    pub fn remove(&mut self, query: &str) {
        let query = query.trim().to_lowercase();
        self.queries.retain(|q| q.to_lowercase() != query);
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    /// Write the most recent queries to disk.
    pub fn write(&self) -> Result<(), PersistError> {
        let keep = self.queries.len().min(MAX_QUERIES);
        persist::write_json(&self.queries[..keep], &self.path)
    }
}
