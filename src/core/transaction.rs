//! Per-batch transaction control.
//!
//! `Open -> Processing -> {Committed, RolledBack}`. Records are upserted one at a
//! time; a failing record is recorded and the rest of the batch continues. The
//! batch commits only if at least one record succeeded. A commit failure rolls the
//! whole batch back and is reported on the batch without stopping the run. Losing
//! the connection is the only error returned to the caller.

use crate::core::reporter::{BatchReport, BatchState, FailureKind, RecordFailure};
use crate::domain::model::Batch;
use crate::domain::ports::TargetStore;
use crate::utils::error::{ImportError, Result};

pub struct BatchTransactionController<'s, S: TargetStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: TargetStore + ?Sized> BatchTransactionController<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    pub async fn process(&self, batch: &Batch) -> Result<BatchReport> {
        let mut report = BatchReport {
            number: batch.number,
            size: batch.len(),
            state: BatchState::Open,
            succeeded: 0,
            failed: 0,
            dependents_written: 0,
            commit_error: None,
            failures: Vec::new(),
        };

        let mut tx = self.store.begin().await?;
        report.state = BatchState::Processing;
        tracing::debug!("Batch {} open ({} records)", batch.number, batch.len());

        let mut applied = Vec::with_capacity(batch.len());
        for record in &batch.records {
            match tx.upsert(record).await {
                Ok(outcome) => {
                    report.succeeded += 1;
                    report.dependents_written += outcome.dependents_written;
                    applied.push(record);
                }
                Err(e) if e.is_connection_loss() => {
                    tracing::error!(
                        "💥 Batch {}: connection lost at row {}: {}",
                        batch.number,
                        record.row,
                        e
                    );
                    if let Err(rollback_err) = tx.rollback().await {
                        tracing::warn!(
                            "Batch {}: rollback after connection loss failed: {}",
                            batch.number,
                            rollback_err
                        );
                    }
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        "❌ Batch {}: row {} (key {}) failed: {}",
                        batch.number,
                        record.row,
                        record.key,
                        e
                    );
                    report.failed += 1;
                    report.failures.push(RecordFailure {
                        file: record.file.clone(),
                        row: Some(record.row),
                        key: Some(record.key.to_string()),
                        batch: Some(batch.number),
                        kind: FailureKind::UpsertFailed,
                        message: e.to_string(),
                    });
                }
            }
        }

        if report.succeeded == 0 {
            if let Err(e) = tx.rollback().await {
                tracing::warn!("Batch {}: rollback failed: {}", batch.number, e);
            }
            report.state = BatchState::RolledBack;
            tracing::warn!(
                "⚠️ Batch {}: no record succeeded, nothing committed",
                batch.number
            );
            return Ok(report);
        }

        match tx.commit().await {
            Ok(()) => {
                report.state = BatchState::Committed;
                tracing::info!(
                    "✅ Batch {} committed: {} succeeded, {} failed",
                    batch.number,
                    report.succeeded,
                    report.failed
                );
            }
            Err(e) if e.is_connection_loss() => {
                tracing::error!("💥 Batch {}: connection lost during commit: {}", batch.number, e);
                return Err(e);
            }
            Err(e) => {
                let err = ImportError::CommitError {
                    batch: batch.number,
                    message: e.to_string(),
                };
                tracing::error!("💥 {}; {} record(s) rolled back", err, applied.len());
                for record in applied {
                    report.failures.push(RecordFailure {
                        file: record.file.clone(),
                        row: Some(record.row),
                        key: Some(record.key.to_string()),
                        batch: Some(batch.number),
                        kind: FailureKind::CommitFailed,
                        message: err.to_string(),
                    });
                }
                report.failed += report.succeeded;
                report.succeeded = 0;
                report.dependents_written = 0;
                report.state = BatchState::RolledBack;
                report.commit_error = Some(err.to_string());
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_store::MemoryStore;
    use crate::domain::model::{Field, FieldValue, NaturalKey, NormalizedRecord};

    fn batch(keys: &[&str]) -> Batch {
        Batch {
            number: 1,
            records: keys
                .iter()
                .enumerate()
                .map(|(i, key)| NormalizedRecord {
                    file: None,
                    row: i + 2,
                    key: NaturalKey::parse(key).unwrap(),
                    fields: vec![Field {
                        name: "preco".to_string(),
                        value: FieldValue::Number(Some(i as f64)),
                    }],
                    dependents: vec![],
                })
                .collect(),
        }
    }

    fn ten_keys() -> Vec<String> {
        (1..=10).map(|i| format!("K{}", i)).collect()
    }

    #[tokio::test]
    async fn test_single_failure_is_isolated() {
        let store = MemoryStore::new();
        store.fail_key("K5");
        let keys = ten_keys();
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();

        let report = BatchTransactionController::new(&store)
            .process(&batch(&keys))
            .await
            .unwrap();

        assert_eq!(report.state, BatchState::Committed);
        assert_eq!(report.succeeded, 9);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].key.as_deref(), Some("K5"));
        assert_eq!(store.len(), 9);
        assert!(store.get("K5").is_none());
    }

    #[tokio::test]
    async fn test_all_failed_batch_rolls_back() {
        let store = MemoryStore::new();
        store.fail_key("A");
        store.fail_key("B");

        let report = BatchTransactionController::new(&store)
            .process(&batch(&["A", "B"]))
            .await
            .unwrap();

        assert_eq!(report.state, BatchState::RolledBack);
        assert_eq!(report.failed, 2);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_commit_failure_rolls_back_everything() {
        let store = MemoryStore::new();
        store.fail_next_commit();

        let report = BatchTransactionController::new(&store)
            .process(&batch(&["A", "B", "C"]))
            .await
            .unwrap();

        assert_eq!(report.state, BatchState::RolledBack);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed, 3);
        assert!(report.commit_error.is_some());
        assert!(report
            .failures
            .iter()
            .all(|f| f.kind == FailureKind::CommitFailed));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_connection_loss_is_returned() {
        let store = MemoryStore::new();
        store.lose_connection_at("B");

        let result = BatchTransactionController::new(&store)
            .process(&batch(&["A", "B", "C"]))
            .await;

        assert!(result.unwrap_err().is_connection_loss());
        assert_eq!(store.len(), 0);
    }
}
