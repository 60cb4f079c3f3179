// Adapters layer: concrete source readers and target stores behind the domain ports.

pub mod memory_store;
pub mod spreadsheet;
pub mod sql_store;
