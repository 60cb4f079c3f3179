//! Relational target store over sqlx's `Any` driver (PostgreSQL or SQLite).
//!
//! Each batch runs in one transaction. Each record runs inside a savepoint nested in
//! that transaction, so a failed statement is undone on its own and the batch can
//! still commit the records around it.

use crate::core::upsert::UpsertStatements;
use crate::domain::model::{FieldValue, NormalizedRecord, UpsertOutcome};
use crate::domain::ports::{BatchTransaction, TargetStore};
use crate::utils::error::{ImportError, Result};
use async_trait::async_trait;
use sqlx::any::{AnyArguments, AnyPoolOptions};
use sqlx::query::Query;
use sqlx::{Any, AnyConnection, AnyPool, Connection, Transaction};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SqlStoreOptions {
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl Default for SqlStoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqlStore {
    pool: AnyPool,
    statements: UpsertStatements,
}

impl SqlStore {
    pub async fn connect(
        database_url: &str,
        options: &SqlStoreOptions,
        statements: UpsertStatements,
    ) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.connect_timeout)
            .connect(database_url)
            .await
            .map_err(|e| ImportError::ConnectionError {
                message: e.to_string(),
            })?;

        tracing::info!("✅ Connected to target store");
        Ok(Self::from_pool(pool, statements))
    }

    pub fn from_pool(pool: AnyPool, statements: UpsertStatements) -> Self {
        Self { pool, statements }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("Target store connection closed");
    }
}

#[async_trait]
impl TargetStore for SqlStore {
    async fn prepare_schema(&self) -> Result<()> {
        for sql in self.statements.schema_sql() {
            tracing::debug!("Schema: {}", sql);
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|e| ImportError::from_store(e, None))?;
        }
        Ok(())
    }

    async fn truncate(&self) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ImportError::from_store(e, None))?;
        for sql in self.statements.truncate_sql() {
            sqlx::query(&sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| ImportError::from_store(e, None))?;
        }
        tx.commit()
            .await
            .map_err(|e| ImportError::from_store(e, None))?;
        tracing::info!("🗑️ Target table '{}' truncated", self.statements.table);
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn BatchTransaction + '_>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ImportError::ConnectionError {
                message: e.to_string(),
            })?;
        Ok(Box::new(SqlTransaction {
            tx,
            statements: &self.statements,
        }))
    }
}

struct SqlTransaction<'s> {
    tx: Transaction<'static, Any>,
    statements: &'s UpsertStatements,
}

fn bind_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: Option<&FieldValue>,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        Some(FieldValue::Text(text)) => query.bind(text.clone()),
        Some(FieldValue::Number(number)) => query.bind(*number),
        None => query.bind(Option::<String>::None),
    }
}

async fn apply(
    statements: &UpsertStatements,
    conn: &mut AnyConnection,
    record: &NormalizedRecord,
) -> std::result::Result<UpsertOutcome, sqlx::Error> {
    let mut query = sqlx::query(&statements.upsert_sql);
    for column in &statements.columns {
        query = if *column == statements.key_column {
            query.bind(record.key.to_string())
        } else {
            bind_value(query, record.get(column))
        };
    }
    query.execute(&mut *conn).await?;

    let mut outcome = UpsertOutcome::default();
    if let Some(dependents) = &statements.dependents {
        sqlx::query(&dependents.delete_sql)
            .bind(record.key.to_string())
            .execute(&mut *conn)
            .await?;

        for dependent in &record.dependents {
            let mut insert = sqlx::query(&dependents.insert_sql)
                .bind(record.key.to_string())
                .bind(dependent.value.clone())
                .bind(dependent.position as i64);
            if dependents.spec.kind_column.is_some() {
                insert = insert.bind(
                    dependents
                        .spec
                        .kind_label(dependent.position)
                        .map(str::to_string),
                );
            }
            insert.execute(&mut *conn).await?;
            outcome.dependents_written += 1;
        }
    }

    Ok(outcome)
}

#[async_trait]
impl BatchTransaction for SqlTransaction<'_> {
    async fn upsert(&mut self, record: &NormalizedRecord) -> Result<UpsertOutcome> {
        let key = record.key.as_str();
        let mut savepoint = Connection::begin(&mut *self.tx)
            .await
            .map_err(|e| ImportError::from_store(e, Some(key)))?;

        match apply(self.statements, &mut savepoint, record).await {
            Ok(outcome) => {
                savepoint
                    .commit()
                    .await
                    .map_err(|e| ImportError::from_store(e, Some(key)))?;
                Ok(outcome)
            }
            Err(e) => {
                savepoint
                    .rollback()
                    .await
                    .map_err(|rollback| ImportError::from_store(rollback, Some(key)))?;
                Err(ImportError::from_store(e, Some(key)))
            }
        }
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| ImportError::from_store(e, None))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| ImportError::from_store(e, None))
    }
}
