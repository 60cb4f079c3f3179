pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliArgs;
pub use config::ImportConfig;

pub use adapters::{memory_store::MemoryStore, spreadsheet::SpreadsheetReader, sql_store::SqlStore};
pub use core::importer::{ImportSettings, Importer};
pub use core::reporter::RunOutcome;
pub use utils::error::{ImportError, Result};
