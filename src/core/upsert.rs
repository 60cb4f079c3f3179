//! SQL text for the upsert executor, built once per run from the field mapping.
//!
//! The statements use `$n` placeholders and `ON CONFLICT ... DO UPDATE`, which both
//! PostgreSQL and SQLite accept. Identifiers are validated by the config layer and
//! are interpolated unquoted.

use crate::core::mapping::{DependentsSpec, FieldKind, FieldMapping, FieldSpec};

#[derive(Debug, Clone, PartialEq)]
pub struct DependentStatements {
    pub spec: DependentsSpec,
    pub delete_sql: String,
    pub insert_sql: String,
    pub create_sql: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertStatements {
    pub table: String,
    pub key_column: String,
    /// Bind order of `upsert_sql`.
    pub columns: Vec<String>,
    pub upsert_sql: String,
    pub create_sql: String,
    pub dependents: Option<DependentStatements>,
}

fn placeholders(from: usize, count: usize) -> String {
    (from..from + count)
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_type(spec: &FieldSpec) -> String {
    match (spec.kind, spec.max_length, spec.scale) {
        (FieldKind::Number, _, Some(scale)) => format!("NUMERIC(18, {})", scale),
        (FieldKind::Number, _, None) => "DOUBLE PRECISION".to_string(),
        (_, Some(max), _) => format!("VARCHAR({})", max),
        (_, None, _) => "TEXT".to_string(),
    }
}

impl UpsertStatements {
    pub fn new(table: &str, mapping: &FieldMapping) -> Self {
        let key_column = mapping.key_spec().field.clone();
        let columns: Vec<String> = mapping.fields().iter().map(|f| f.field.clone()).collect();

        let updates: Vec<String> = columns
            .iter()
            .filter(|c| **c != key_column)
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        let conflict_action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        let upsert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
            table,
            columns.join(", "),
            placeholders(1, columns.len()),
            key_column,
            conflict_action
        );

        let column_defs: Vec<String> = mapping
            .fields()
            .iter()
            .map(|spec| {
                let constraint = if spec.field == key_column {
                    " NOT NULL UNIQUE"
                } else {
                    ""
                };
                format!("{} {}{}", spec.field, column_type(spec), constraint)
            })
            .collect();
        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            table,
            column_defs.join(", ")
        );

        let key_type = column_type(mapping.key_spec());
        let dependents = mapping
            .dependents()
            .map(|spec| DependentStatements::new(spec, &key_type));

        Self {
            table: table.to_string(),
            key_column,
            columns,
            upsert_sql,
            create_sql,
            dependents,
        }
    }

    /// Dependents table first, then the target table.
    pub fn truncate_sql(&self) -> Vec<String> {
        let mut statements = Vec::new();
        if let Some(dependents) = &self.dependents {
            statements.push(format!("DELETE FROM {}", dependents.spec.table));
        }
        statements.push(format!("DELETE FROM {}", self.table));
        statements
    }

    pub fn schema_sql(&self) -> Vec<String> {
        let mut statements = vec![self.create_sql.clone()];
        if let Some(dependents) = &self.dependents {
            statements.push(dependents.create_sql.clone());
        }
        statements
    }
}

impl DependentStatements {
    fn new(spec: &DependentsSpec, key_type: &str) -> Self {
        let mut columns = vec![
            spec.key_column.as_str(),
            spec.value_column.as_str(),
            spec.position_column.as_str(),
        ];
        if let Some(kind) = &spec.kind_column {
            columns.push(kind.as_str());
        }

        let delete_sql = format!("DELETE FROM {} WHERE {} = $1", spec.table, spec.key_column);
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            spec.table,
            columns.join(", "),
            placeholders(1, columns.len())
        );

        let value_type = spec
            .max_length
            .map(|n| format!("VARCHAR({})", n))
            .unwrap_or_else(|| "TEXT".to_string());
        let kind_def = spec
            .kind_column
            .as_ref()
            .map(|c| format!(", {} VARCHAR(50)", c))
            .unwrap_or_default();
        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS {t} ({k} {kt} NOT NULL, {v} {vt}, {p} INTEGER NOT NULL{kind}, PRIMARY KEY ({k}, {p}))",
            t = spec.table,
            k = spec.key_column,
            kt = key_type,
            v = spec.value_column,
            vt = value_type,
            p = spec.position_column,
            kind = kind_def,
        );

        Self {
            spec: spec.clone(),
            delete_sql,
            insert_sql,
            create_sql,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing_mapping() -> FieldMapping {
        FieldMapping::new(
            vec![
                FieldSpec::text("Integração", "integracao").with_max_length(255),
                FieldSpec::text("Identificador", "identificador").with_max_length(255),
                FieldSpec::number("Preço", "preco").with_scale(2),
            ],
            "identificador",
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_upsert_sql_updates_every_non_key_column() {
        let statements = UpsertStatements::new("anuncios", &listing_mapping());
        assert_eq!(
            statements.upsert_sql,
            "INSERT INTO anuncios (integracao, identificador, preco) VALUES ($1, $2, $3) \
             ON CONFLICT (identificador) DO UPDATE SET integracao = excluded.integracao, preco = excluded.preco"
        );
        assert_eq!(statements.columns, vec!["integracao", "identificador", "preco"]);
    }

    #[test]
    fn test_create_sql_types() {
        let statements = UpsertStatements::new("anuncios", &listing_mapping());
        assert_eq!(
            statements.create_sql,
            "CREATE TABLE IF NOT EXISTS anuncios (integracao VARCHAR(255), \
             identificador VARCHAR(255) NOT NULL UNIQUE, preco NUMERIC(18, 2))"
        );
    }

    #[test]
    fn test_key_only_mapping_does_nothing_on_conflict() {
        let mapping =
            FieldMapping::new(vec![FieldSpec::text("SKU", "sku")], "sku", None).unwrap();
        let statements = UpsertStatements::new("skus", &mapping);
        assert!(statements.upsert_sql.ends_with("ON CONFLICT (sku) DO NOTHING"));
    }

    #[test]
    fn test_dependent_statements() {
        let mapping = FieldMapping::new(
            vec![FieldSpec::text("Código (SKU)", "codigo_sku").with_max_length(100)],
            "codigo_sku",
            Some(DependentsSpec {
                table: "produto_imagens".to_string(),
                key_column: "sku_produto".to_string(),
                value_column: "url_imagem".to_string(),
                position_column: "ordem_imagem".to_string(),
                kind_column: Some("tipo_imagem".to_string()),
                first_kind: Some("Principal".to_string()),
                other_kind: Some("Secundária".to_string()),
                max_length: Some(500),
                source_columns: vec!["URL imagem 1".to_string()],
            }),
        )
        .unwrap();

        let statements = UpsertStatements::new("produtos", &mapping);
        let dependents = statements.dependents.as_ref().unwrap();
        assert_eq!(
            dependents.insert_sql,
            "INSERT INTO produto_imagens (sku_produto, url_imagem, ordem_imagem, tipo_imagem) \
             VALUES ($1, $2, $3, $4)"
        );
        assert_eq!(
            dependents.delete_sql,
            "DELETE FROM produto_imagens WHERE sku_produto = $1"
        );
        assert!(dependents.create_sql.contains("sku_produto VARCHAR(100) NOT NULL"));
        assert!(dependents.create_sql.contains("PRIMARY KEY (sku_produto, ordem_imagem)"));
        assert_eq!(
            statements.truncate_sql(),
            vec!["DELETE FROM produto_imagens", "DELETE FROM produtos"]
        );
    }
}
