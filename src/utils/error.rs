use crate::core::reporter::RunOutcome;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Spreadsheet error: {0}")]
    SpreadsheetError(#[from] calamine::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration '{field}'")]
    MissingConfigError { field: String },

    #[error("Cannot read source '{path}': {message}")]
    SourceReadError { path: String, message: String },

    #[error("Source columns do not match the field mapping: {message}")]
    SchemaMismatchError { message: String },

    #[error("Target store connection failed: {message}")]
    ConnectionError { message: String },

    #[error("Upsert failed for key '{key}': {message}")]
    UpsertError { key: String, message: String },

    #[error("Commit of batch {batch} failed: {message}")]
    CommitError { batch: usize, message: String },

    #[error("Import aborted: {source}")]
    RunAborted {
        outcome: Box<RunOutcome>,
        #[source]
        source: Box<ImportError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Source,
    Schema,
    Store,
    Record,
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ImportError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ImportError::ConfigValidationError { .. }
            | ImportError::InvalidConfigValueError { .. }
            | ImportError::MissingConfigError { .. } => ErrorCategory::Configuration,
            ImportError::SpreadsheetError(_)
            | ImportError::CsvError(_)
            | ImportError::IoError(_)
            | ImportError::SourceReadError { .. } => ErrorCategory::Source,
            ImportError::SchemaMismatchError { .. } => ErrorCategory::Schema,
            ImportError::DatabaseError(_) | ImportError::ConnectionError { .. } => {
                ErrorCategory::Store
            }
            ImportError::UpsertError { .. } | ImportError::SerializationError(_) => {
                ErrorCategory::Record
            }
            ImportError::CommitError { .. } => ErrorCategory::Batch,
            ImportError::RunAborted { source, .. } => source.category(),
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Record => ErrorSeverity::Low,
            ErrorCategory::Batch => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Source | ErrorCategory::Schema => {
                ErrorSeverity::High
            }
            ErrorCategory::Store => ErrorSeverity::Critical,
        }
    }

    /// True for transport-level failures that leave the store unreachable.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, ImportError::ConnectionError { .. })
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => {
                "Check the TOML file and the environment variables it references"
            }
            ErrorCategory::Source => "Make sure the spreadsheet exists and is a valid xlsx/xls/ods/csv file",
            ErrorCategory::Schema => {
                "Compare the [[fields]] columns with the header row of the sheet (see source.header_row)"
            }
            ErrorCategory::Store => "Verify the database is reachable and target.database_url is correct",
            ErrorCategory::Record => "Inspect the listed rows in the source file and re-run the import",
            ErrorCategory::Batch => {
                "Re-run the import; committed batches are durable and upserts are idempotent"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            ImportError::SourceReadError { path, .. } => {
                format!("Could not read the source file '{}'", path)
            }
            ImportError::SchemaMismatchError { message } => {
                format!("The sheet does not match the configured columns: {}", message)
            }
            ImportError::ConnectionError { .. } => "Could not reach the database".to_string(),
            ImportError::RunAborted { outcome, source } => format!(
                "Import aborted after {} committed batch(es): {}",
                outcome.batches_committed,
                source.user_friendly_message()
            ),
            other => other.to_string(),
        }
    }

    /// Splits sqlx failures into connection loss and statement failures. With a key the
    /// statement failure is attributed to that record.
    pub fn from_store(err: sqlx::Error, key: Option<&str>) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => ImportError::ConnectionError {
                message: err.to_string(),
            },
            other => match key {
                Some(key) => ImportError::UpsertError {
                    key: key.to_string(),
                    message: other.to_string(),
                },
                None => ImportError::DatabaseError(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
