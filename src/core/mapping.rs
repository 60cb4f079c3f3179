//! Explicit column-to-field mapping and its resolution against a sheet header.
//!
//! Columns are matched by exact (trimmed) header text only. A mapped column that is
//! missing or appears more than once fails the run before anything is written.

use crate::utils::error::{ImportError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Number,
    Flag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Header text in the source sheet.
    pub column: String,
    /// Target column name.
    pub field: String,
    #[serde(default)]
    pub kind: FieldKind,
    pub max_length: Option<usize>,
    /// Decimal places kept for number fields.
    pub scale: Option<u32>,
    #[serde(default)]
    pub required: bool,
    pub true_value: Option<String>,
    pub false_value: Option<String>,
}

impl FieldSpec {
    pub fn text(column: &str, field: &str) -> Self {
        Self {
            column: column.to_string(),
            field: field.to_string(),
            kind: FieldKind::Text,
            max_length: None,
            scale: None,
            required: false,
            true_value: None,
            false_value: None,
        }
    }

    pub fn number(column: &str, field: &str) -> Self {
        Self {
            kind: FieldKind::Number,
            ..Self::text(column, field)
        }
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// One-to-many child rows keyed by the parent's natural key (e.g. product images).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentsSpec {
    pub table: String,
    pub key_column: String,
    pub value_column: String,
    pub position_column: String,
    pub kind_column: Option<String>,
    pub first_kind: Option<String>,
    pub other_kind: Option<String>,
    pub max_length: Option<usize>,
    pub source_columns: Vec<String>,
}

impl DependentsSpec {
    /// Label stored in `kind_column` for the given 1-based position.
    pub fn kind_label(&self, position: usize) -> Option<&str> {
        if position == 1 {
            self.first_kind.as_deref()
        } else {
            self.other_kind.as_deref()
        }
    }
}

/// Largest scale a `NUMERIC(18, s)` column can hold.
pub const MAX_SCALE: u32 = 18;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    fields: Vec<FieldSpec>,
    /// Index of the natural key within `fields`.
    key_index: usize,
    dependents: Option<DependentsSpec>,
}

#[derive(Debug, Clone)]
pub struct ResolvedField {
    pub spec: FieldSpec,
    pub column_index: usize,
}

#[derive(Debug, Clone)]
pub struct ResolvedMapping {
    pub fields: Vec<ResolvedField>,
    /// Position of the natural key within `fields`.
    pub key_position: usize,
    pub dependent_columns: Vec<usize>,
    pub dependents: Option<DependentsSpec>,
}

impl ResolvedMapping {
    pub fn key_field(&self) -> &ResolvedField {
        &self.fields[self.key_position]
    }
}

impl FieldMapping {
    pub fn new(
        fields: Vec<FieldSpec>,
        natural_key: impl Into<String>,
        dependents: Option<DependentsSpec>,
    ) -> Result<Self> {
        let natural_key = natural_key.into();
        if let Some(spec) = fields
            .iter()
            .find(|f| f.scale.is_some_and(|scale| scale > MAX_SCALE))
        {
            return Err(ImportError::InvalidConfigValueError {
                field: "fields.scale".to_string(),
                value: spec.field.clone(),
                reason: format!("Scale must be at most {}", MAX_SCALE),
            });
        }

        let key_index = match fields.iter().position(|f| f.field == natural_key) {
            Some(index) if fields[index].kind == FieldKind::Text => index,
            Some(_) => {
                return Err(ImportError::InvalidConfigValueError {
                    field: "target.natural_key".to_string(),
                    value: natural_key,
                    reason: "Natural key must be a text field".to_string(),
                })
            }
            None => {
                return Err(ImportError::InvalidConfigValueError {
                    field: "target.natural_key".to_string(),
                    value: natural_key,
                    reason: "Natural key is not one of the mapped fields".to_string(),
                })
            }
        };

        Ok(Self {
            fields,
            key_index,
            dependents,
        })
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn dependents(&self) -> Option<&DependentsSpec> {
        self.dependents.as_ref()
    }

    pub fn key_spec(&self) -> &FieldSpec {
        &self.fields[self.key_index]
    }

    /// Binds every mapped column to its header position.
    pub fn resolve(&self, headers: &[String]) -> Result<ResolvedMapping> {
        let mut positions: HashMap<&str, Vec<usize>> = HashMap::new();
        for (index, header) in headers.iter().enumerate() {
            positions.entry(header.trim()).or_default().push(index);
        }

        let mut missing = Vec::new();
        let mut ambiguous = Vec::new();
        let mut locate = |column: &str| -> Option<usize> {
            match positions.get(column.trim()).map(Vec::as_slice) {
                Some([index]) => Some(*index),
                Some(_) => {
                    ambiguous.push(column.to_string());
                    None
                }
                None => {
                    missing.push(column.to_string());
                    None
                }
            }
        };

        let mut fields = Vec::with_capacity(self.fields.len());
        for spec in &self.fields {
            if let Some(column_index) = locate(&spec.column) {
                fields.push(ResolvedField {
                    spec: spec.clone(),
                    column_index,
                });
            }
        }

        let mut dependent_columns = Vec::new();
        if let Some(dependents) = &self.dependents {
            for column in &dependents.source_columns {
                if let Some(index) = locate(column) {
                    dependent_columns.push(index);
                }
            }
        }

        if !missing.is_empty() || !ambiguous.is_empty() {
            let mut problems = Vec::new();
            if !missing.is_empty() {
                problems.push(format!("missing columns [{}]", missing.join(", ")));
            }
            if !ambiguous.is_empty() {
                problems.push(format!(
                    "columns appearing more than once [{}]",
                    ambiguous.join(", ")
                ));
            }
            return Err(ImportError::SchemaMismatchError {
                message: problems.join("; "),
            });
        }

        let mapped: Vec<usize> = fields
            .iter()
            .map(|f| f.column_index)
            .chain(dependent_columns.iter().copied())
            .collect();
        for (index, header) in headers.iter().enumerate() {
            if !mapped.contains(&index) && !header.trim().is_empty() {
                tracing::debug!("Ignoring unmapped column '{}'", header);
            }
        }

        Ok(ResolvedMapping {
            fields,
            key_position: self.key_index,
            dependent_columns,
            dependents: self.dependents.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn listing_mapping() -> FieldMapping {
        FieldMapping::new(
            vec![
                FieldSpec::text("Identificador", "identificador"),
                FieldSpec::text("Título", "titulo"),
                FieldSpec::number("Preço", "preco"),
            ],
            "identificador",
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_by_exact_header() {
        let resolved = listing_mapping()
            .resolve(&headers(&["Id", "Preço", " Identificador ", "Título", "Extra"]))
            .unwrap();

        let indexes: Vec<usize> = resolved.fields.iter().map(|f| f.column_index).collect();
        assert_eq!(indexes, vec![2, 3, 1]);
        assert_eq!(resolved.key_field().spec.field, "identificador");
    }

    #[test]
    fn test_resolve_reports_missing_and_ambiguous_columns() {
        let err = listing_mapping()
            .resolve(&headers(&["Identificador", "Título", "Título"]))
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("missing columns [Preço]"));
        assert!(message.contains("more than once [Título]"));
    }

    #[test]
    fn test_natural_key_must_be_mapped_text_field() {
        let fields = vec![FieldSpec::number("Id", "id")];
        assert!(FieldMapping::new(fields.clone(), "id", None).is_err());
        assert!(FieldMapping::new(fields, "codigo", None).is_err());
    }

    #[test]
    fn test_key_spec_follows_natural_key_position() {
        let mapping = listing_mapping();
        assert_eq!(mapping.key_spec().field, "identificador");
        assert_eq!(mapping.fields().len(), 3);
        assert!(mapping.dependents().is_none());
    }

    #[test]
    fn test_scale_above_numeric_precision_is_rejected() {
        let fields = vec![
            FieldSpec::text("Id", "id"),
            FieldSpec::number("Preço", "preco").with_scale(19),
        ];
        let err = FieldMapping::new(fields.clone(), "id", None).unwrap_err();
        assert!(matches!(err, ImportError::InvalidConfigValueError { .. }));

        let mut fields = fields;
        fields[1].scale = Some(MAX_SCALE);
        assert!(FieldMapping::new(fields, "id", None).is_ok());
    }

    #[test]
    fn test_resolve_dependent_columns_in_order() {
        let mapping = FieldMapping::new(
            vec![FieldSpec::text("Código (SKU)", "codigo_sku")],
            "codigo_sku",
            Some(DependentsSpec {
                table: "produto_imagens".to_string(),
                key_column: "sku_produto".to_string(),
                value_column: "url_imagem".to_string(),
                position_column: "ordem_imagem".to_string(),
                kind_column: None,
                first_kind: None,
                other_kind: None,
                max_length: None,
                source_columns: vec!["URL imagem 2".to_string(), "URL imagem 1".to_string()],
            }),
        )
        .unwrap();

        let resolved = mapping
            .resolve(&headers(&["Código (SKU)", "URL imagem 1", "URL imagem 2"]))
            .unwrap();
        assert_eq!(resolved.dependent_columns, vec![2, 1]);
    }
}
