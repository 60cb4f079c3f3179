pub mod batcher;
pub mod importer;
pub mod mapping;
pub mod normalizer;
pub mod reporter;
pub mod transaction;
pub mod upsert;

pub use crate::domain::model::{Cell, FieldValue, NormalizedRecord, SourceRecord, SourceTable};
pub use crate::domain::ports::{BatchTransaction, SourceReader, TargetStore};
pub use crate::utils::error::Result;
