use crate::adapters::spreadsheet::{SourceFormat, SpreadsheetReader};
use crate::adapters::sql_store::SqlStoreOptions;
use crate::core::batcher::DEFAULT_BATCH_SIZE;
use crate::core::importer::ImportSettings;
use crate::core::mapping::{DependentsSpec, FieldKind, FieldMapping, FieldSpec, MAX_SCALE};
use crate::utils::error::{ImportError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    pub import: ImportSection,
    pub source: SourceSection,
    pub target: TargetSection,
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSection {
    pub name: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub truncate_target_before_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSection {
    /// A single workbook, or a directory whose workbooks are merged.
    #[serde(default)]
    pub path: Option<String>,
    /// Workbooks merged in the order listed.
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub format: SourceFormat,
    pub sheet: Option<String>,
    #[serde(default)]
    pub header_row: usize,
    pub delimiter: Option<char>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSection {
    pub database_url: String,
    pub table: String,
    pub natural_key: String,
    #[serde(default)]
    pub create_if_missing: bool,
    pub max_connections: Option<u32>,
    pub connect_timeout_seconds: Option<u64>,
    pub dependents: Option<DependentsSpec>,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn env_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| regex::Regex::new(r"\$\{([^}]+)\}").expect("env pattern is valid"))
}

impl ImportConfig {
    /// Loads an import definition from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ImportError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| ImportError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unset variables stay verbatim.
    fn substitute_env_vars(content: &str) -> String {
        env_pattern()
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("import.name", &self.import.name)?;
        validation::validate_positive_number("import.batch_size", self.import.batch_size, 1)?;
        let sources = self.source_paths();
        if sources.is_empty() {
            return Err(ImportError::MissingConfigError {
                field: "source.path".to_string(),
            });
        }
        for path in &sources {
            validation::validate_path("source.paths", path)?;
        }
        if let Some(delimiter) = self.source.delimiter {
            if !delimiter.is_ascii() {
                return Err(ImportError::InvalidConfigValueError {
                    field: "source.delimiter".to_string(),
                    value: delimiter.to_string(),
                    reason: "Delimiter must be a single ASCII character".to_string(),
                });
            }
        }

        validation::validate_database_url("target.database_url", &self.target.database_url)?;
        validation::validate_identifier("target.table", &self.target.table)?;
        if let Some(max) = self.target.max_connections {
            validation::validate_positive_number("target.max_connections", max as usize, 1)?;
        }

        if self.fields.is_empty() {
            return Err(ImportError::MissingConfigError {
                field: "fields".to_string(),
            });
        }
        for spec in &self.fields {
            validation::validate_identifier("fields.field", &spec.field)?;
            validation::validate_non_empty_string("fields.column", &spec.column)?;
            if let Some(max) = spec.max_length {
                validation::validate_positive_number("fields.max_length", max, 1)?;
            }
            if spec.kind != FieldKind::Number && spec.scale.is_some() {
                return Err(ImportError::InvalidConfigValueError {
                    field: "fields.scale".to_string(),
                    value: spec.field.clone(),
                    reason: "Scale only applies to number fields".to_string(),
                });
            }
            if spec.scale.is_some_and(|scale| scale > MAX_SCALE) {
                return Err(ImportError::InvalidConfigValueError {
                    field: "fields.scale".to_string(),
                    value: spec.field.clone(),
                    reason: format!("Scale must be at most {}", MAX_SCALE),
                });
            }
        }
        validation::validate_unique(
            "fields.field",
            "target field",
            self.fields.iter().map(|f| f.field.as_str()),
        )?;
        validation::validate_unique(
            "fields.column",
            "source column",
            self.fields.iter().map(|f| f.column.trim()),
        )?;

        if let Some(dependents) = &self.target.dependents {
            validation::validate_identifier("target.dependents.table", &dependents.table)?;
            for (name, column) in [
                ("target.dependents.key_column", &dependents.key_column),
                ("target.dependents.value_column", &dependents.value_column),
                ("target.dependents.position_column", &dependents.position_column),
            ] {
                validation::validate_identifier(name, column)?;
            }
            if let Some(kind) = &dependents.kind_column {
                validation::validate_identifier("target.dependents.kind_column", kind)?;
            }
            if let Some(max) = dependents.max_length {
                validation::validate_positive_number("target.dependents.max_length", max, 1)?;
            }
            if dependents.source_columns.is_empty() {
                return Err(ImportError::MissingConfigError {
                    field: "target.dependents.source_columns".to_string(),
                });
            }
            validation::validate_unique(
                "target.dependents.source_columns",
                "source column",
                dependents
                    .source_columns
                    .iter()
                    .map(|c| c.trim())
                    .chain(self.fields.iter().map(|f| f.column.trim())),
            )?;
        }

        // Natural key checks live in the mapping constructor.
        self.to_mapping().map(|_| ())
    }

    pub fn to_mapping(&self) -> Result<FieldMapping> {
        FieldMapping::new(
            self.fields.clone(),
            self.target.natural_key.clone(),
            self.target.dependents.clone(),
        )
    }

    pub fn to_settings(&self) -> Result<ImportSettings> {
        Ok(ImportSettings {
            name: self.import.name.clone(),
            batch_size: self.import.batch_size,
            truncate_before_run: self.import.truncate_target_before_run,
            mapping: self.to_mapping()?,
        })
    }

    /// `path` first, then every entry of `paths`.
    pub fn source_paths(&self) -> Vec<&str> {
        self.source
            .path
            .iter()
            .chain(self.source.paths.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn reader(&self) -> SpreadsheetReader {
        let mut reader = SpreadsheetReader::from_paths(self.source_paths())
            .with_format(self.source.format)
            .with_sheet(self.source.sheet.clone())
            .with_header_row(self.source.header_row);
        if let Some(delimiter) = self.source.delimiter {
            reader = reader.with_delimiter(delimiter as u8);
        }
        reader
    }

    pub fn store_options(&self) -> SqlStoreOptions {
        let defaults = SqlStoreOptions::default();
        SqlStoreOptions {
            max_connections: self.target.max_connections.unwrap_or(defaults.max_connections),
            connect_timeout: self
                .target
                .connect_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
        }
    }
}

impl Validate for ImportConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
