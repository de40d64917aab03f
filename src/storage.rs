use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::domain::{NormalizedTradeline, ReconciliationKey};
use crate::error::{PipelineError, Result};

/// Result of handing a batch to storage. Partial failure is allowed: some
/// records may store while others error.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PersistOutcome {
    pub success: bool,
    pub stored_count: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Storage trait for persisting reconciled tradelines. The pipeline knows
/// nothing of the storage schema beyond the NormalizedTradeline field set.
/// Implementations backed by a database should enforce a unique constraint
/// on (user, reconciliation key) to back up the reconciler's per-key locks.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Look up a stored tradeline by identity key, scoped to one bureau and
    /// one user. The same account reported by two bureaus is two rows.
    async fn load_existing_tradeline(
        &self,
        key: &ReconciliationKey,
        bureau: &str,
        user_id: &str,
    ) -> Result<Option<NormalizedTradeline>>;

    /// Upsert a batch of reconciled records for a user.
    async fn persist(
        &self,
        records: &[NormalizedTradeline],
        user_id: &str,
    ) -> Result<PersistOutcome>;
}

/// In-memory storage implementation for development/testing.
pub struct InMemoryStorage {
    tradelines: Arc<Mutex<HashMap<(String, ReconciliationKey), NormalizedTradeline>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            tradelines: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn stored_count(&self) -> usize {
        self.tradelines.lock().unwrap().len()
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn load_existing_tradeline(
        &self,
        key: &ReconciliationKey,
        bureau: &str,
        user_id: &str,
    ) -> Result<Option<NormalizedTradeline>> {
        if key.bureau != bureau {
            return Err(PipelineError::Storage(format!(
                "bureau '{}' does not match key bureau '{}'",
                bureau, key.bureau
            )));
        }
        let tradelines = self.tradelines.lock().unwrap();
        Ok(tradelines
            .get(&(user_id.to_string(), key.clone()))
            .cloned())
    }

    async fn persist(
        &self,
        records: &[NormalizedTradeline],
        user_id: &str,
    ) -> Result<PersistOutcome> {
        let mut outcome = PersistOutcome::default();
        let mut tradelines = self.tradelines.lock().unwrap();

        for record in records {
            match ReconciliationKey::from_record(record) {
                Ok(key) => {
                    tradelines.insert((user_id.to_string(), key), record.clone());
                    outcome.stored_count += 1;
                }
                Err(reason) => {
                    outcome
                        .errors
                        .push(format!("record {} not stored: {}", record.source_index, reason));
                }
            }
        }

        outcome.success = outcome.stored_count > 0 || records.is_empty();
        debug!(
            stored = outcome.stored_count,
            errors = outcome.errors.len(),
            "persisted batch"
        );
        Ok(outcome)
    }
}
