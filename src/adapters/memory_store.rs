//! In-process target store with the same transactional semantics as `SqlStore`:
//! upserts are staged per batch and become visible only on commit. Backs dry runs
//! and supports failure injection.

use crate::domain::model::{NormalizedRecord, UpsertOutcome};
use crate::domain::ports::{BatchTransaction, TargetStore};
use crate::utils::error::{ImportError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    rows: BTreeMap<String, NormalizedRecord>,
    failing_keys: HashSet<String>,
    fail_next_commit: bool,
    lose_connection_at: Option<String>,
    truncations: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.state().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<NormalizedRecord> {
        self.state().rows.get(key).cloned()
    }

    pub fn truncations(&self) -> usize {
        self.state().truncations
    }

    /// Every upsert of `key` fails as a statement error.
    pub fn fail_key(&self, key: &str) {
        self.state().failing_keys.insert(key.to_string());
    }

    pub fn fail_next_commit(&self) {
        self.state().fail_next_commit = true;
    }

    /// The upsert of `key` reports a lost connection.
    pub fn lose_connection_at(&self, key: &str) {
        self.state().lose_connection_at = Some(key.to_string());
    }
}

#[async_trait]
impl TargetStore for MemoryStore {
    async fn prepare_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn truncate(&self) -> Result<()> {
        let mut state = self.state();
        state.rows.clear();
        state.truncations += 1;
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn BatchTransaction + '_>> {
        Ok(Box::new(MemoryTransaction {
            store: self,
            staged: Vec::new(),
        }))
    }
}

struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    staged: Vec<NormalizedRecord>,
}

#[async_trait]
impl BatchTransaction for MemoryTransaction<'_> {
    async fn upsert(&mut self, record: &NormalizedRecord) -> Result<UpsertOutcome> {
        let key = record.key.as_str();
        {
            let state = self.store.state();
            if state.lose_connection_at.as_deref() == Some(key) {
                return Err(ImportError::ConnectionError {
                    message: "connection reset by peer".to_string(),
                });
            }
            if state.failing_keys.contains(key) {
                return Err(ImportError::UpsertError {
                    key: key.to_string(),
                    message: "rejected by store".to_string(),
                });
            }
        }

        self.staged.push(record.clone());
        Ok(UpsertOutcome {
            dependents_written: record.dependents.len(),
        })
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction { store, staged } = *self;
        let mut state = store.state();
        if std::mem::take(&mut state.fail_next_commit) {
            return Err(ImportError::DatabaseError(sqlx::Error::Protocol(
                "simulated commit failure".to_string(),
            )));
        }
        for record in staged {
            state.rows.insert(record.key.to_string(), record);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
