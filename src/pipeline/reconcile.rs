use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::{NormalizedTradeline, ReconciliationKey, FIELD_MAP};
use crate::error::Result;
use crate::storage::Storage;

/// Partitioned result of reconciling one batch against stored records.
#[derive(Debug, Default)]
pub struct ReconciliationOutcome {
    /// Everything that should be persisted: new sightings plus merges
    pub to_save: Vec<NormalizedTradeline>,
    /// Records that collided with a stored row and were combined
    pub merged: Vec<NormalizedTradeline>,
    /// First sightings of an identity key
    pub new: Vec<NormalizedTradeline>,
    /// Records whose identity key could not be constructed, with reasons
    pub invalid: Vec<(NormalizedTradeline, String)>,
}

/// Detects and merges records that describe the same real-world tradeline.
/// Lookup-then-merge for a given identity key is serialized through a
/// per-key lock so concurrent runs cannot both create a first sighting.
/// Database-backed storage should still carry a unique constraint on the key.
pub struct Reconciler {
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn reconcile(
        &self,
        candidates: &[NormalizedTradeline],
        storage: &dyn Storage,
        user_id: &str,
    ) -> Result<ReconciliationOutcome> {
        let mut outcome = ReconciliationOutcome::default();

        for candidate in candidates {
            let key = match ReconciliationKey::from_record(candidate) {
                Ok(key) => key,
                Err(reason) => {
                    warn!(
                        source_index = candidate.source_index,
                        %reason,
                        "dropping record with unusable identity"
                    );
                    outcome.invalid.push((candidate.clone(), reason));
                    continue;
                }
            };

            let lock = self.lock_for(&key).await;
            let _guard = lock.lock().await;

            let existing = storage
                .load_existing_tradeline(&key, &key.bureau, user_id)
                .await?;

            match existing {
                Some(existing) => {
                    debug!(
                        source_index = candidate.source_index,
                        creditor = %key.creditor,
                        bureau = %key.bureau,
                        "identity collision, merging"
                    );
                    let merged = merge_tradelines(&existing, candidate);
                    outcome.to_save.push(merged.clone());
                    outcome.merged.push(merged);
                }
                None => {
                    outcome.to_save.push(candidate.clone());
                    outcome.new.push(candidate.clone());
                }
            }
        }

        info!(
            new = outcome.new.len(),
            merged = outcome.merged.len(),
            invalid = outcome.invalid.len(),
            "reconciliation complete"
        );
        Ok(outcome)
    }

    async fn lock_for(&self, key: &ReconciliationKey) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks
            .entry(key.lock_token())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

/// Combine an existing stored record with a new sighting of the same key.
/// Mergeable fields fill only where the existing value is empty or a
/// placeholder; a populated existing field is never overwritten.
pub fn merge_tradelines(
    existing: &NormalizedTradeline,
    incoming: &NormalizedTradeline,
) -> NormalizedTradeline {
    let mut merged = existing.clone();

    for &(field, mergeable) in FIELD_MAP {
        if !mergeable {
            continue;
        }
        if merged.field_is_empty(field) && !incoming.field_is_empty(field) {
            merged.copy_field_from(incoming, field);
        }
    }

    // Account number keeps whichever side is non-empty, preferring the
    // longer, more complete string when both are present.
    merged.account_number = match (
        existing.account_number.as_deref().map(str::trim),
        incoming.account_number.as_deref().map(str::trim),
    ) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => {
            Some(if b.len() > a.len() { b } else { a }.to_string())
        }
        (Some(a), _) if !a.is_empty() => Some(a.to_string()),
        (_, Some(b)) if !b.is_empty() => Some(b.to_string()),
        _ => None,
    };

    merged.dispute_count = existing.dispute_count.max(incoming.dispute_count);

    // A sighting confirmed negative keeps the record negative
    if incoming.is_negative && !merged.is_negative {
        merged.is_negative = true;
        merged.negative_confidence = incoming.negative_confidence;
        merged.negative_indicators = incoming.negative_indicators.clone();
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    fn record(creditor: &str, account: &str, bureau: &str) -> NormalizedTradeline {
        NormalizedTradeline {
            creditor_name: Some(creditor.to_string()),
            account_number: Some(account.to_string()),
            date_opened: Some("2020-01-15".to_string()),
            credit_bureau: Some(bureau.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn merging_a_record_into_itself_is_identity() {
        let rec = NormalizedTradeline {
            account_balance: Some(500.0),
            credit_limit: Some(3000.0),
            account_status: Some("Open".to_string()),
            dispute_count: 2,
            ..record("Chase Bank", "4400123456789010", "Equifax")
        };
        assert_eq!(merge_tradelines(&rec, &rec), rec);
    }

    #[test]
    fn merge_never_overwrites_populated_fields() {
        let existing = NormalizedTradeline {
            account_balance: Some(500.0),
            credit_limit: None,
            ..record("Chase Bank", "4400123456789010", "Equifax")
        };
        let incoming = NormalizedTradeline {
            account_balance: Some(999.0),
            credit_limit: Some(3000.0),
            ..record("Chase Bank", "4400123456789010", "Equifax")
        };

        let merged = merge_tradelines(&existing, &incoming);
        assert_eq!(merged.account_balance, Some(500.0));
        assert_eq!(merged.credit_limit, Some(3000.0));
    }

    #[test]
    fn placeholder_fields_are_fillable() {
        let existing = NormalizedTradeline {
            account_status: Some("N/A".to_string()),
            date_opened: Some("xx/xx/xxxx".to_string()),
            ..record("Chase Bank", "4400123456789010", "Equifax")
        };
        let incoming = NormalizedTradeline {
            account_status: Some("Open".to_string()),
            ..record("Chase Bank", "4400123456789010", "Equifax")
        };

        let merged = merge_tradelines(&existing, &incoming);
        assert_eq!(merged.account_status.as_deref(), Some("Open"));
        assert_eq!(merged.date_opened.as_deref(), Some("2020-01-15"));
    }

    #[test]
    fn longer_account_number_wins() {
        let existing = record("Chase Bank", "4400****", "Equifax");
        let incoming = record("Chase Bank", "4400123456789010", "Equifax");
        let merged = merge_tradelines(&existing, &incoming);
        assert_eq!(merged.account_number.as_deref(), Some("4400123456789010"));

        // And the other way around
        let merged = merge_tradelines(&incoming, &existing);
        assert_eq!(merged.account_number.as_deref(), Some("4400123456789010"));
    }

    #[test]
    fn dispute_count_takes_the_maximum() {
        let mut existing = record("Chase Bank", "4400123456789010", "Equifax");
        existing.dispute_count = 3;
        let mut incoming = existing.clone();
        incoming.dispute_count = 1;
        assert_eq!(merge_tradelines(&existing, &incoming).dispute_count, 3);
    }

    #[tokio::test]
    async fn first_sighting_is_new_second_is_merged() {
        let storage = InMemoryStorage::new();
        let reconciler = Reconciler::new();

        let first = record("Chase Bank", "4400123456789010", "Equifax");
        let outcome = reconciler
            .reconcile(&[first.clone()], &storage, "user-1")
            .await
            .unwrap();
        assert_eq!(outcome.new.len(), 1);
        assert!(outcome.merged.is_empty());
        storage.persist(&outcome.to_save, "user-1").await.unwrap();

        let mut second = first.clone();
        second.account_balance = Some(750.0);
        let outcome = reconciler
            .reconcile(&[second], &storage, "user-1")
            .await
            .unwrap();
        assert!(outcome.new.is_empty());
        assert_eq!(outcome.merged.len(), 1);
        assert_eq!(outcome.merged[0].account_balance, Some(750.0));
    }

    #[tokio::test]
    async fn same_account_across_bureaus_never_merges() {
        let storage = InMemoryStorage::new();
        let reconciler = Reconciler::new();

        let equifax = record("Chase Bank", "4400123456789010", "Equifax");
        let outcome = reconciler
            .reconcile(&[equifax], &storage, "user-1")
            .await
            .unwrap();
        storage.persist(&outcome.to_save, "user-1").await.unwrap();

        let transunion = record("Chase Bank", "4400123456789010", "TransUnion");
        let outcome = reconciler
            .reconcile(&[transunion], &storage, "user-1")
            .await
            .unwrap();
        assert_eq!(outcome.new.len(), 1);
        assert!(outcome.merged.is_empty());
    }

    #[tokio::test]
    async fn unusable_identity_is_partitioned_invalid() {
        let storage = InMemoryStorage::new();
        let reconciler = Reconciler::new();

        let mut no_bureau = record("Chase Bank", "4400123456789010", "Equifax");
        no_bureau.credit_bureau = None;
        let outcome = reconciler
            .reconcile(&[no_bureau], &storage, "user-1")
            .await
            .unwrap();
        assert!(outcome.to_save.is_empty());
        assert_eq!(outcome.invalid.len(), 1);
        assert!(outcome.invalid[0].1.contains("bureau"));
    }
}
