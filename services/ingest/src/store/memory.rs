use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{Filter, Record, RecordId, Store, Table, Value};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Tables {
    rows: BTreeMap<Table, Vec<(RecordId, Record)>>,
    next_id: RecordId,
    failing: HashSet<Table>,
    without_ids: HashSet<Table>,
}

/// In-process store. Ids are assigned sequentially across all tables.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a row directly, bypassing failure injection.
    pub fn seed(&self, record: Record) -> RecordId {
        let mut tables = self.lock();
        tables.next_id += 1;
        let id = tables.next_id;
        tables.rows.entry(record.table).or_default().push((id, record));
        id
    }

    /// Make every later insert into `table` fail.
    pub fn fail_inserts(&self, table: Table) {
        self.lock().failing.insert(table);
    }

    /// Make later inserts into `table` succeed without reporting an id.
    pub fn omit_ids(&self, table: Table) {
        self.lock().without_ids.insert(table);
    }

    /// Rows of `table` in insertion order.
    pub fn rows(&self, table: Table) -> Vec<(RecordId, Record)> {
        self.lock().rows.get(&table).cloned().unwrap_or_default()
    }

    pub fn count(&self, table: Table) -> usize {
        self.lock().rows.get(&table).map(Vec::len).unwrap_or(0)
    }
}

fn matches(record: &Record, filter: &Filter) -> bool {
    match filter {
        Filter::Eq(column, Value::Null) | Filter::IsNull(column) => {
            matches!(record.get(column), None | Some(Value::Null))
        }
        Filter::Eq(column, value) => record.get(column) == Some(value),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_one(&self, table: Table, filters: &[Filter]) -> Result<Option<RecordId>, StoreError> {
        let tables = self.lock();
        let found = tables.rows.get(&table).and_then(|rows| {
            rows.iter()
                .find(|(_, record)| filters.iter().all(|f| matches(record, f)))
                .map(|(id, _)| *id)
        });
        Ok(found)
    }

    async fn insert(&self, record: Record) -> Result<Option<RecordId>, StoreError> {
        let (failing, without_id) = {
            let tables = self.lock();
            (
                tables.failing.contains(&record.table),
                tables.without_ids.contains(&record.table),
            )
        };
        if failing {
            return Err(StoreError::Rejected {
                table: record.table,
                reason: "injected failure".to_string(),
            });
        }
        let id = self.seed(record);
        Ok(if without_id { None } else { Some(id) })
    }
}
