use crate::domain::model::{NormalizedRecord, SourceTable, UpsertOutcome};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait SourceReader: Send + Sync {
    /// Reads the whole sheet. Any failure here is fatal to the run.
    fn read(&self) -> impl std::future::Future<Output = Result<SourceTable>> + Send;

    /// Human-readable origin for logs and errors.
    fn describe(&self) -> String;
}

#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Creates the target tables when they do not exist yet.
    async fn prepare_schema(&self) -> Result<()>;

    /// Removes every row from the dependents table and the target table.
    async fn truncate(&self) -> Result<()>;

    async fn begin(&self) -> Result<Box<dyn BatchTransaction + '_>>;
}

/// One open batch transaction. Dropping it without `commit` discards its writes.
#[async_trait]
pub trait BatchTransaction: Send {
    /// Atomic insert-or-update against the natural key. A failed call leaves no trace
    /// and does not invalidate the transaction for later records.
    async fn upsert(&mut self, record: &NormalizedRecord) -> Result<UpsertOutcome>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
