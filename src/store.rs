//! Expectation storage.
//!
//! A keyed table of expectations shared between the admin endpoints and every
//! in-flight request. Reads take the shared lock only long enough to copy the
//! table; ordering and matching happen on the copy.

use crate::config::{self, Expectation};
use crate::error::MockError;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Concurrency-safe expectation table keyed by expectation key.
#[derive(Debug, Default)]
pub struct ExpectationStore {
    expectations: RwLock<HashMap<String, Expectation>>,
}

impl ExpectationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an expectation, replacing any existing one with the same key.
    pub async fn add(&self, mut exp: Expectation) {
        exp.normalize();
        debug!(key = %exp.key, priority = exp.priority, "Storing expectation");
        self.expectations.write().await.insert(exp.key.clone(), exp);
    }

    /// Insert a batch of expectations.
    ///
    /// The whole batch is validated first; if any entry is rejected nothing is
    /// inserted. Accepted batches are applied under a single write lock, in
    /// order, so a later entry replaces an earlier one with the same key.
    pub async fn add_many(&self, exps: Vec<Expectation>) -> Result<usize, MockError> {
        config::validate_all(&exps)?;

        let count = exps.len();
        let mut table = self.expectations.write().await;
        for mut exp in exps {
            exp.normalize();
            table.insert(exp.key.clone(), exp);
        }
        Ok(count)
    }

    /// Insert expectations from a JSON array.
    pub async fn add_from_str(&self, json: &str) -> Result<usize, MockError> {
        let exps = config::parse_expectations(json)?;
        let count = self.add_many(exps).await?;
        info!(count, "Loaded expectations from string");
        Ok(count)
    }

    /// Insert expectations from a file holding an array of them.
    pub async fn add_from_file(&self, path: &Path) -> Result<usize, MockError> {
        let exps = config::load_expectations_file(path)?;
        let count = self.add_many(exps).await?;
        info!(count, path = %path.display(), "Loaded expectations from file");
        Ok(count)
    }

    /// Remove the expectation with `key`. Returns whether one was present.
    pub async fn remove(&self, key: &str) -> bool {
        let removed = self.expectations.write().await.remove(key).is_some();
        debug!(key, removed, "Removing expectation");
        removed
    }

    /// Point-in-time copy of all expectations, highest priority first.
    ///
    /// Expectations sharing a priority come out in no particular order.
    pub async fn snapshot_ordered(&self) -> Vec<Expectation> {
        let mut snapshot: Vec<Expectation> =
            self.expectations.read().await.values().cloned().collect();
        snapshot.sort_by(|a, b| b.priority.cmp(&a.priority));
        snapshot
    }

    /// Look up a single expectation.
    pub async fn get(&self, key: &str) -> Option<Expectation> {
        self.expectations.read().await.get(key).cloned()
    }

    /// Number of stored expectations.
    pub async fn len(&self) -> usize {
        self.expectations.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.expectations.read().await.is_empty()
    }
}
