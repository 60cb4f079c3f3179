use crate::config::toml_config::ImportConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "sheet-importer")]
#[command(about = "Import a spreadsheet into a relational table with batched upserts")]
pub struct CliArgs {
    /// Path to the TOML import definition
    #[arg(short, long, default_value = "import.toml")]
    pub config: PathBuf,

    /// Override import.batch_size
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Delete every target row before importing
    #[arg(long, conflicts_with = "no_truncate")]
    pub truncate: bool,

    /// Keep existing target rows even if the config asks for truncation
    #[arg(long)]
    pub no_truncate: bool,

    /// Create the target tables when they do not exist
    #[arg(long)]
    pub create_table: bool,

    /// Run against an in-memory store; the database is never contacted
    #[arg(long)]
    pub dry_run: bool,

    /// Write the run outcome as JSON to this file
    #[arg(long)]
    pub summary_json: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

impl CliArgs {
    /// Applies command-line overrides on top of the loaded file.
    pub fn apply_overrides(&self, config: &mut ImportConfig) {
        if let Some(batch_size) = self.batch_size {
            config.import.batch_size = batch_size;
            tracing::info!("🔧 Batch size overridden to: {}", batch_size);
        }
        if self.truncate {
            config.import.truncate_target_before_run = true;
            tracing::info!("🔧 Truncate before run enabled");
        }
        if self.no_truncate {
            config.import.truncate_target_before_run = false;
            tracing::info!("🔧 Truncate before run disabled");
        }
        if self.create_table {
            config.target.create_if_missing = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[import]
name = "skus"
truncate_target_before_run = true

[source]
path = "skus.csv"

[target]
database_url = "sqlite::memory:"
table = "skus"
natural_key = "sku"

[[fields]]
column = "SKU"
field = "sku"
"#;

    #[test]
    fn test_overrides() {
        let args = CliArgs::parse_from([
            "sheet-importer",
            "--config",
            "skus.toml",
            "--batch-size",
            "25",
            "--no-truncate",
            "--create-table",
        ]);
        let mut config = ImportConfig::from_toml_str(MINIMAL).unwrap();
        args.apply_overrides(&mut config);

        assert_eq!(args.config, PathBuf::from("skus.toml"));
        assert_eq!(config.import.batch_size, 25);
        assert!(!config.import.truncate_target_before_run);
        assert!(config.target.create_if_missing);
    }

    #[test]
    fn test_truncate_flags_conflict() {
        assert!(CliArgs::try_parse_from(["sheet-importer", "--truncate", "--no-truncate"]).is_err());
    }
}
