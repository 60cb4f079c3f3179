//! Run engine: source → normalizer → batcher → per-batch transaction → report.

use crate::core::batcher::Batcher;
use crate::core::mapping::FieldMapping;
use crate::core::normalizer::{Normalized, Normalizer};
use crate::core::reporter::{RunOutcome, RunReporter};
use crate::core::transaction::BatchTransactionController;
use crate::domain::model::NormalizedRecord;
use crate::domain::ports::{SourceReader, TargetStore};
use crate::utils::error::{ImportError, Result};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub name: String,
    pub batch_size: usize,
    pub truncate_before_run: bool,
    pub mapping: FieldMapping,
}

pub struct Importer<R: SourceReader, S: TargetStore> {
    reader: R,
    store: S,
    settings: ImportSettings,
}

impl<R: SourceReader, S: TargetStore> Importer<R, S> {
    pub fn new(reader: R, store: S, settings: ImportSettings) -> Self {
        Self {
            reader,
            store,
            settings,
        }
    }

    /// Runs one import to completion.
    ///
    /// Source and schema failures return before anything is written. A lost
    /// connection stops the run after the in-flight batch rolls back and returns
    /// [`ImportError::RunAborted`] with the outcome of the batches that finished.
    /// Record and batch failures never stop the run; they are in the outcome.
    pub async fn run(&self) -> Result<RunOutcome> {
        let batcher = Batcher::new(self.settings.batch_size)?;
        let mut reporter = RunReporter::new(&self.settings.name);
        tracing::info!(
            "🚀 Starting import '{}' (run {}) from {}",
            self.settings.name,
            reporter.run_id(),
            self.reader.describe()
        );

        let table = self.reader.read().await?;
        let normalizer = Normalizer::new(self.settings.mapping.resolve(&table.headers)?);

        reporter.seen(table.records.len());
        let mut ready: Vec<NormalizedRecord> = Vec::with_capacity(table.records.len());
        let mut occurrences: HashMap<String, usize> = HashMap::new();
        for record in &table.records {
            match normalizer.normalize(record) {
                Normalized::Ready(normalized) => {
                    let count = occurrences.entry(normalized.key.to_string()).or_default();
                    *count += 1;
                    if *count == 2 {
                        tracing::warn!(
                            "⚠️ Duplicate key '{}' at row {}; the later row wins",
                            normalized.key,
                            normalized.row
                        );
                        reporter.duplicate_key(normalized.key.as_str());
                    }
                    ready.push(normalized);
                }
                Normalized::Skipped { row } => {
                    tracing::debug!("Row {} skipped: blank key", row);
                    reporter.skipped(row);
                }
                Normalized::Invalid(failure) => {
                    tracing::warn!(
                        "❌ Row {} rejected: {}",
                        failure.row.unwrap_or_default(),
                        failure.message
                    );
                    reporter.invalid(failure);
                }
            }
        }
        tracing::info!(
            "🔄 Normalized {} record(s): {} ready",
            table.records.len(),
            ready.len()
        );

        if self.settings.truncate_before_run {
            self.store.truncate().await?;
        }

        let batches = batcher.partition(ready);
        reporter.batches_planned(batches.len());
        tracing::info!(
            "📦 {} batch(es) of up to {} record(s)",
            batches.len(),
            batcher.size()
        );

        let controller = BatchTransactionController::new(&self.store);
        for batch in &batches {
            match controller.process(batch).await {
                Ok(report) => reporter.batch(report),
                Err(e) => {
                    let outcome = reporter.finish();
                    tracing::error!(
                        "💥 Import '{}' aborted at batch {} of {}: {}",
                        outcome.name,
                        batch.number,
                        outcome.batches_total,
                        e
                    );
                    return Err(ImportError::RunAborted {
                        outcome: Box::new(outcome),
                        source: Box::new(e),
                    });
                }
            }
        }

        let outcome = reporter.finish();
        tracing::info!(
            "🏁 Import '{}' finished: {} seen, {} skipped, {} succeeded, {} failed, {}/{} batch(es) committed",
            outcome.name,
            outcome.records_seen,
            outcome.records_skipped,
            outcome.records_succeeded,
            outcome.records_failed,
            outcome.batches_committed,
            outcome.batches_total
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_store::MemoryStore;
    use crate::core::mapping::FieldSpec;
    use crate::domain::model::{Cell, FieldValue, SourceRecord, SourceTable};

    struct StaticReader(Option<SourceTable>);

    impl SourceReader for StaticReader {
        async fn read(&self) -> Result<SourceTable> {
            self.0.clone().ok_or_else(|| ImportError::SourceReadError {
                path: "static".to_string(),
                message: "file not found".to_string(),
            })
        }

        fn describe(&self) -> String {
            "static".to_string()
        }
    }

    fn table(rows: &[(&str, &str)]) -> SourceTable {
        SourceTable {
            headers: vec!["Identificador".to_string(), "Preço".to_string()],
            records: rows
                .iter()
                .enumerate()
                .map(|(i, (key, price))| SourceRecord {
                    file: None,
                    row: i + 2,
                    cells: vec![Cell::from(*key), Cell::from(*price)],
                })
                .collect(),
        }
    }

    fn settings(batch_size: usize, truncate: bool) -> ImportSettings {
        ImportSettings {
            name: "anuncios".to_string(),
            batch_size,
            truncate_before_run: truncate,
            mapping: FieldMapping::new(
                vec![
                    FieldSpec::text("Identificador", "identificador"),
                    FieldSpec::number("Preço", "preco").with_scale(2),
                ],
                "identificador",
                None,
            )
            .unwrap(),
        }
    }

    #[tokio::test]
    async fn test_counts_are_conserved() {
        let store = MemoryStore::new();
        store.fail_key("C");
        let reader = StaticReader(Some(table(&[
            ("A", "1,00"),
            ("", "2,00"),
            ("B", "N/A"),
            ("C", "3"),
            ("A", "4,50"),
        ])));

        let outcome = Importer::new(reader, store.clone(), settings(2, false))
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.records_seen, 5);
        assert_eq!(outcome.records_skipped, 1);
        assert_eq!(outcome.skipped_rows, vec![3]);
        assert_eq!(outcome.records_succeeded, 3);
        assert_eq!(outcome.records_failed, 1);
        assert_eq!(outcome.batches_total, 2);
        assert_eq!(outcome.duplicate_keys, vec!["A"]);
        assert!(outcome.is_conserved());
        assert!(!outcome.is_clean());

        let a = store.get("A").unwrap();
        assert_eq!(a.get("preco").and_then(|v| v.as_number()), Some(4.5));
        let b = store.get("B").unwrap();
        assert_eq!(b.get("preco"), Some(&FieldValue::Number(None)));
    }

    #[tokio::test]
    async fn test_truncate_runs_after_successful_read() {
        let store = MemoryStore::new();
        let outcome = Importer::new(
            StaticReader(Some(table(&[("X", "1")]))),
            store.clone(),
            settings(100, true),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(store.truncations(), 1);
        assert_eq!(outcome.batches_committed, 1);
        assert!(outcome.is_clean());
    }

    #[tokio::test]
    async fn test_unreadable_source_touches_nothing() {
        let store = MemoryStore::new();
        let err = Importer::new(StaticReader(None), store.clone(), settings(100, true))
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, ImportError::SourceReadError { .. }));
        assert_eq!(store.truncations(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_missing_column_fails_before_writes() {
        let store = MemoryStore::new();
        let mut source = table(&[("X", "1")]);
        source.headers[1] = "Valor".to_string();

        let err = Importer::new(StaticReader(Some(source)), store.clone(), settings(100, true))
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, ImportError::SchemaMismatchError { .. }));
        assert_eq!(store.truncations(), 0);
    }

    #[tokio::test]
    async fn test_connection_loss_aborts_with_partial_outcome() {
        let store = MemoryStore::new();
        store.lose_connection_at("D");
        let reader = StaticReader(Some(table(&[
            ("A", "1"),
            ("B", "2"),
            ("C", "3"),
            ("D", "4"),
            ("E", "5"),
        ])));

        let err = Importer::new(reader, store.clone(), settings(2, false))
            .run()
            .await
            .unwrap_err();

        match err {
            ImportError::RunAborted { outcome, source } => {
                assert!(source.is_connection_loss());
                assert_eq!(outcome.batches_committed, 1);
                assert_eq!(outcome.batches_total, 3);
                assert_eq!(outcome.records_succeeded, 2);
            }
            other => panic!("expected RunAborted, got {other:?}"),
        }
        assert_eq!(store.len(), 2);
        assert!(store.get("C").is_none());
    }
}
