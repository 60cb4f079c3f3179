use anyhow::Context;
use clap::Parser;
use sheet_importer::core::upsert::UpsertStatements;
use sheet_importer::domain::ports::TargetStore;
use sheet_importer::utils::error::ErrorSeverity;
use sheet_importer::utils::{logger, validation::Validate};
use sheet_importer::{
    CliArgs, ImportConfig, ImportError, Importer, MemoryStore, Result, RunOutcome, SqlStore,
};
use std::path::Path;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting sheet-importer");
    tracing::info!("📁 Loading configuration from: {}", args.config.display());

    let mut config = match ImportConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "❌ Failed to load config file '{}': {}",
                args.config.display(),
                e
            );
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    args.apply_overrides(&mut config);

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");
    display_config_summary(&config, &args);

    match import(&config, args.dry_run).await {
        Ok(outcome) => {
            println!("{}", outcome);
            write_summary(args.summary_json.as_deref(), &outcome);

            if outcome.is_clean() {
                println!("✅ Import completed successfully!");
            } else {
                println!(
                    "⚠️ Import completed with {} failed record(s) and {} rolled-back batch(es)",
                    outcome.records_failed, outcome.batches_rolled_back
                );
                std::process::exit(2);
            }
        }
        Err(e) => {
            tracing::error!(
                "❌ Import failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            if let ImportError::RunAborted { outcome, .. } = &e {
                println!("{}", outcome);
                write_summary(args.summary_json.as_deref(), outcome);
            }

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }
}

async fn import(config: &ImportConfig, dry_run: bool) -> Result<RunOutcome> {
    let settings = config.to_settings()?;
    let reader = config.reader();

    if dry_run {
        tracing::info!("🔍 DRY RUN MODE - the database will not be contacted");
        return Importer::new(reader, MemoryStore::new(), settings).run().await;
    }

    let statements = UpsertStatements::new(&config.target.table, &settings.mapping);
    let store = SqlStore::connect(
        &config.target.database_url,
        &config.store_options(),
        statements,
    )
    .await?;

    if config.target.create_if_missing {
        store.prepare_schema().await?;
    }

    let result = Importer::new(reader, store.clone(), settings).run().await;
    store.close().await;
    result
}

fn write_summary(path: Option<&Path>, outcome: &RunOutcome) {
    let Some(path) = path else {
        return;
    };
    match save_summary(path, outcome) {
        Ok(()) => tracing::info!("📄 Summary written to {}", path.display()),
        Err(e) => tracing::warn!("{:#}", e),
    }
}

fn save_summary(path: &Path, outcome: &RunOutcome) -> anyhow::Result<()> {
    let json = outcome.to_json().context("Could not serialize the run outcome")?;
    std::fs::write(path, json)
        .with_context(|| format!("Could not write summary to {}", path.display()))?;
    Ok(())
}

fn display_config_summary(config: &ImportConfig, args: &CliArgs) {
    println!("📋 Import Summary:");
    println!("  Import: {}", config.import.name);
    println!("  Source: {}", config.source_paths().join(", "));
    println!(
        "  Target: {} (key: {})",
        config.target.table, config.target.natural_key
    );
    println!("  Fields: {}", config.fields.len());
    if let Some(dependents) = &config.target.dependents {
        println!(
            "  Dependents: {} ({} column(s))",
            dependents.table,
            dependents.source_columns.len()
        );
    }
    println!("  Batch Size: {}", config.import.batch_size);
    println!(
        "  Truncate Before Run: {}",
        config.import.truncate_target_before_run
    );

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }
}
