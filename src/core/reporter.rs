use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Open,
    Processing,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rejected by the normalizer (empty required field); never sent to the store.
    InvalidRecord,
    UpsertFailed,
    /// The record's upsert succeeded but its batch failed to commit.
    CommitFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFailure {
    /// Source workbook, set when the run merges more than one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub row: Option<usize>,
    pub key: Option<String>,
    pub batch: Option<usize>,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub number: usize,
    pub size: usize,
    pub state: BatchState,
    pub succeeded: usize,
    pub failed: usize,
    pub dependents_written: usize,
    pub commit_error: Option<String>,
    #[serde(skip)]
    pub failures: Vec<RecordFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records_seen: usize,
    pub records_skipped: usize,
    pub records_succeeded: usize,
    pub records_failed: usize,
    pub batches_committed: usize,
    pub batches_rolled_back: usize,
    pub batches_total: usize,
    pub dependents_written: usize,
    pub duplicate_keys: Vec<String>,
    pub skipped_rows: Vec<usize>,
    pub batches: Vec<BatchReport>,
    pub errors: Vec<RecordFailure>,
}

impl RunOutcome {
    /// Both count identities hold.
    pub fn is_conserved(&self) -> bool {
        self.records_seen == self.records_skipped + self.records_succeeded + self.records_failed
            && self.batches_committed + self.batches_rolled_back == self.batches_total
    }

    pub fn is_clean(&self) -> bool {
        self.records_failed == 0 && self.batches_rolled_back == 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Import '{}' ({})", self.name, self.run_id)?;
        writeln!(f, "  Records seen:      {}", self.records_seen)?;
        writeln!(f, "  Skipped (no key):  {}", self.records_skipped)?;
        writeln!(f, "  Succeeded:         {}", self.records_succeeded)?;
        writeln!(f, "  Failed:            {}", self.records_failed)?;
        writeln!(
            f,
            "  Batches:           {} committed, {} rolled back of {}",
            self.batches_committed, self.batches_rolled_back, self.batches_total
        )?;
        if self.dependents_written > 0 {
            writeln!(f, "  Dependent rows:    {}", self.dependents_written)?;
        }
        if !self.duplicate_keys.is_empty() {
            writeln!(f, "  Duplicate keys:    {}", self.duplicate_keys.join(", "))?;
        }
        for failure in self.errors.iter().take(20) {
            let origin = match &failure.file {
                Some(file) => format!("{} ", file),
                None => String::new(),
            };
            writeln!(
                f,
                "  ! {}row {} key {}: {}",
                origin,
                failure.row.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string()),
                failure.key.as_deref().unwrap_or("-"),
                failure.message
            )?;
        }
        if self.errors.len() > 20 {
            writeln!(f, "  ... and {} more errors", self.errors.len() - 20)?;
        }
        write!(
            f,
            "  Elapsed:           {}ms",
            (self.finished_at - self.started_at).num_milliseconds()
        )
    }
}

/// Accumulates outcomes as the run progresses; does not influence control flow.
pub struct RunReporter {
    outcome: RunOutcome,
}

impl RunReporter {
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        Self {
            outcome: RunOutcome {
                run_id: Uuid::new_v4(),
                name: name.to_string(),
                started_at: now,
                finished_at: now,
                records_seen: 0,
                records_skipped: 0,
                records_succeeded: 0,
                records_failed: 0,
                batches_committed: 0,
                batches_rolled_back: 0,
                batches_total: 0,
                dependents_written: 0,
                duplicate_keys: Vec::new(),
                skipped_rows: Vec::new(),
                batches: Vec::new(),
                errors: Vec::new(),
            },
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.outcome.run_id
    }

    pub fn seen(&mut self, count: usize) {
        self.outcome.records_seen += count;
    }

    pub fn skipped(&mut self, row: usize) {
        self.outcome.records_skipped += 1;
        self.outcome.skipped_rows.push(row);
    }

    pub fn invalid(&mut self, failure: RecordFailure) {
        self.outcome.records_failed += 1;
        self.outcome.errors.push(failure);
    }

    pub fn duplicate_key(&mut self, key: &str) {
        self.outcome.duplicate_keys.push(key.to_string());
    }

    pub fn batches_planned(&mut self, count: usize) {
        self.outcome.batches_total = count;
    }

    pub fn batch(&mut self, report: BatchReport) {
        match report.state {
            BatchState::Committed => self.outcome.batches_committed += 1,
            _ => self.outcome.batches_rolled_back += 1,
        }
        self.outcome.records_succeeded += report.succeeded;
        self.outcome.records_failed += report.failed;
        self.outcome.dependents_written += report.dependents_written;
        self.outcome.errors.extend(report.failures.iter().cloned());
        self.outcome.batches.push(report);
    }

    pub fn finish(mut self) -> RunOutcome {
        self.outcome.finished_at = Utc::now();
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(number: usize, state: BatchState, succeeded: usize, failed: usize) -> BatchReport {
        BatchReport {
            number,
            size: succeeded + failed,
            state,
            succeeded,
            failed,
            dependents_written: 0,
            commit_error: None,
            failures: (0..failed)
                .map(|i| RecordFailure {
                    file: None,
                    row: Some(i + 2),
                    key: None,
                    batch: Some(number),
                    kind: FailureKind::UpsertFailed,
                    message: "boom".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_counts_are_conserved() {
        let mut reporter = RunReporter::new("anuncios");
        reporter.seen(25);
        reporter.skipped(4);
        reporter.batches_planned(3);
        reporter.batch(report(1, BatchState::Committed, 9, 1));
        reporter.batch(report(2, BatchState::Committed, 10, 0));
        reporter.batch(report(3, BatchState::RolledBack, 0, 4));

        let outcome = reporter.finish();
        assert!(outcome.is_conserved());
        assert!(!outcome.is_clean());
        assert_eq!(outcome.records_succeeded, 19);
        assert_eq!(outcome.records_failed, 5);
        assert_eq!(outcome.errors.len(), 5);
        assert_eq!(outcome.batches_committed, 2);
        assert_eq!(outcome.batches_rolled_back, 1);
    }

    #[test]
    fn test_summary_formats() {
        let mut reporter = RunReporter::new("produtos");
        reporter.seen(1);
        reporter.batches_planned(1);
        reporter.batch(report(1, BatchState::Committed, 1, 0));
        let outcome = reporter.finish();

        let text = outcome.to_string();
        assert!(text.contains("Succeeded:         1"));

        let json: serde_json::Value = serde_json::from_str(&outcome.to_json().unwrap()).unwrap();
        assert_eq!(json["records_succeeded"], 1);
        assert_eq!(json["batches"][0]["state"], "committed");
    }

    #[test]
    fn test_failures_name_their_workbook() {
        let mut reporter = RunReporter::new("anuncios");
        reporter.seen(2);
        reporter.invalid(RecordFailure {
            file: Some("loja2.csv".to_string()),
            row: Some(7),
            key: Some("MLB9".to_string()),
            batch: None,
            kind: FailureKind::InvalidRecord,
            message: "required field 'titulo' is empty".to_string(),
        });
        reporter.invalid(RecordFailure {
            file: None,
            row: Some(3),
            key: None,
            batch: None,
            kind: FailureKind::InvalidRecord,
            message: "bad".to_string(),
        });
        let outcome = reporter.finish();

        let text = outcome.to_string();
        assert!(text.contains("! loja2.csv row 7 key MLB9"));
        assert!(text.contains("! row 3 key -"));

        let json: serde_json::Value = serde_json::from_str(&outcome.to_json().unwrap()).unwrap();
        assert_eq!(json["errors"][0]["file"], "loja2.csv");
        assert!(json["errors"][1].get("file").is_none());
    }
}
