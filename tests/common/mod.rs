#![allow(dead_code)]

use sheet_importer::core::mapping::{DependentsSpec, FieldMapping, FieldSpec};
use sheet_importer::core::upsert::UpsertStatements;
use sheet_importer::SqlStore;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use std::path::PathBuf;
use tempfile::TempDir;

/// One pooled connection that never expires, so the in-memory database lives as
/// long as the pool.
pub async fn sqlite_pool() -> AnyPool {
    sqlx::any::install_default_drivers();
    AnyPoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

pub async fn sqlite_store(mapping: &FieldMapping, table: &str) -> SqlStore {
    SqlStore::from_pool(sqlite_pool().await, UpsertStatements::new(table, mapping))
}

pub fn write_source(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

pub fn listing_mapping() -> FieldMapping {
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

pub fn product_mapping() -> FieldMapping {
    FieldMapping::new(
        vec![
            FieldSpec::text("Código (SKU)", "codigo_sku").with_max_length(100),
            FieldSpec::text("Descrição", "descricao").with_max_length(255),
            FieldSpec::number("Preço", "preco").with_scale(2),
            FieldSpec::number("Estoque", "estoque"),
        ],
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
            source_columns: (1..=3).map(|i| format!("URL imagem {}", i)).collect(),
        }),
    )
    .unwrap()
}

pub async fn count(pool: &AnyPool, sql: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await.unwrap()
}

pub async fn price(pool: &AnyPool, key: &str) -> Option<f64> {
    sqlx::query_scalar::<_, Option<f64>>(
        "SELECT CAST(preco AS REAL) FROM anuncios WHERE identificador = $1",
    )
    .bind(key.to_string())
    .fetch_one(pool)
    .await
    .unwrap()
}
