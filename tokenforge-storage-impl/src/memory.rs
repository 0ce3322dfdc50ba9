use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokenforge_core::error::StorageError;

use crate::storage_traits::{record_id, ConditionalUpdate, Filter, Record, RecordStore, Table};

type Tables = HashMap<Table, BTreeMap<String, Record>>;

/// In-process record store
///
/// Every call takes the table lock once, so `update_if` is a true
/// compare-and-set with respect to other threads.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    tables: RwLock<Tables>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.tables
            .read()
            .map_err(|_| StorageError::Other("record store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.tables
            .write()
            .map_err(|_| StorageError::Other("record store lock poisoned".to_string()))
    }

    /// Number of rows in a table
    pub fn count(&self, table: Table) -> Result<usize, StorageError> {
        Ok(self.read()?.get(&table).map_or(0, BTreeMap::len))
    }
}

fn not_found(table: Table, id: &str) -> StorageError {
    StorageError::NotFound(format!("{table} row {id}"))
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, table: Table, id: &str) -> Result<Option<Record>, StorageError> {
        Ok(self
            .read()?
            .get(&table)
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    fn list(&self, table: Table, filter: &Filter) -> Result<Vec<Record>, StorageError> {
        Ok(self
            .read()?
            .get(&table)
            .map(|rows| {
                rows.values()
                    .filter(|record| filter.matches(record))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn insert(&self, table: Table, record: Record) -> Result<(), StorageError> {
        let id = record_id(&record)?.to_string();
        let mut tables = self.write()?;
        let rows = tables.entry(table).or_default();
        if rows.contains_key(&id) {
            return Err(StorageError::Duplicate(format!("{table} row {id}")));
        }
        rows.insert(id, record);
        Ok(())
    }

    fn update(&self, table: Table, id: &str, fields: Record) -> Result<Record, StorageError> {
        let mut tables = self.write()?;
        let row = tables
            .get_mut(&table)
            .and_then(|rows| rows.get_mut(id))
            .ok_or_else(|| not_found(table, id))?;
        row.extend(fields);
        Ok(row.clone())
    }

    fn update_if(
        &self,
        table: Table,
        id: &str,
        expected: &Filter,
        fields: Record,
    ) -> Result<ConditionalUpdate, StorageError> {
        let mut tables = self.write()?;
        let row = tables
            .get_mut(&table)
            .and_then(|rows| rows.get_mut(id))
            .ok_or_else(|| not_found(table, id))?;
        if !expected.matches(row) {
            return Ok(ConditionalUpdate::Rejected(row.clone()));
        }
        row.extend(fields);
        Ok(ConditionalUpdate::Applied(row.clone()))
    }

    fn delete(&self, table: Table, id: &str) -> Result<bool, StorageError> {
        Ok(self
            .write()?
            .get_mut(&table)
            .map_or(false, |rows| rows.remove(id).is_some()))
    }

    fn delete_where(&self, table: Table, filter: &Filter) -> Result<usize, StorageError> {
        let mut tables = self.write()?;
        let Some(rows) = tables.get_mut(&table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|_, record| !filter.matches(record));
        Ok(before - rows.len())
    }
}
