use serde_json::{Map, Value};
use std::fmt;

use tokenforge_core::error::StorageError;
use tokenforge_core::standard::TokenStandard;
use tokenforge_core::subresources::SubResourceKind;

/// A stored row: a JSON object whose `id` field is its primary key
pub type Record = Map<String, Value>;

/// Every table the engine reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    /// Core token rows
    Tokens,
    /// Extension records of one standard
    Extension(TokenStandard),
    /// One kind of sub-resource rows
    SubResource(SubResourceKind),
    Deployments,
    StatusHistory,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Tokens => "tokens",
            Table::Extension(standard) => standard.extension_table(),
            Table::SubResource(kind) => kind.table(),
            Table::Deployments => "token_deployments",
            Table::StatusHistory => "token_status_history",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Conjunction of field equality conditions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Matches every row
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches rows whose `field` equals `value`
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(field, value)
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| record.get(field).unwrap_or(&Value::Null) == value)
    }
}

/// Result of a conditional update
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalUpdate {
    /// The condition held; carries the row as written
    Applied(Record),
    /// The condition did not hold; carries the row as found
    Rejected(Record),
}

/// Read the primary key of a record
pub fn record_id(record: &Record) -> Result<&str, StorageError> {
    record
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| StorageError::Other("record has no string `id` field".to_string()))
}

/// Generic per-table record store
///
/// Implementations make each single call atomic; nothing spans calls.
pub trait RecordStore: Send + Sync {
    /// Get a row by id
    ///
    /// # Parameters
    /// * `table` - The table to read
    /// * `id` - The row's primary key
    ///
    /// # Returns
    /// Some(record) if the row exists, None otherwise
    fn get(&self, table: Table, id: &str) -> Result<Option<Record>, StorageError>;

    /// List rows matching a filter, ordered by id
    fn list(&self, table: Table, filter: &Filter) -> Result<Vec<Record>, StorageError>;

    /// Insert a new row; its `id` field must not exist yet
    ///
    /// # Returns
    /// `StorageError::Duplicate` if the id is taken
    fn insert(&self, table: Table, record: Record) -> Result<(), StorageError>;

    /// Overwrite the given fields of an existing row, leaving other fields as
    /// they are
    ///
    /// # Returns
    /// The row after the update, or `StorageError::NotFound`
    fn update(&self, table: Table, id: &str, fields: Record) -> Result<Record, StorageError>;

    /// Compare-and-set: apply `fields` only if the stored row still matches
    /// `expected`
    ///
    /// # Parameters
    /// * `table` - The table to write
    /// * `id` - The row's primary key
    /// * `expected` - Conditions the current row must satisfy
    /// * `fields` - Fields to overwrite when it does
    ///
    /// # Returns
    /// `Applied` with the new row or `Rejected` with the current one;
    /// `StorageError::NotFound` if the row is gone
    fn update_if(
        &self,
        table: Table,
        id: &str,
        expected: &Filter,
        fields: Record,
    ) -> Result<ConditionalUpdate, StorageError>;

    /// Delete a row by id
    ///
    /// # Returns
    /// true if a row was deleted
    fn delete(&self, table: Table, id: &str) -> Result<bool, StorageError>;

    /// Delete every row matching a filter
    ///
    /// # Returns
    /// The number of rows deleted
    fn delete_where(&self, table: Table, filter: &Filter) -> Result<usize, StorageError> {
        let mut deleted = 0;
        for record in self.list(table, filter)? {
            if self.delete(table, record_id(&record)?)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_filter_matches_all_conditions() {
        let row = record(json!({ "id": "a", "token_id": "t1", "status": "DRAFT" }));
        assert!(Filter::all().matches(&row));
        assert!(Filter::eq("token_id", "t1").matches(&row));
        assert!(Filter::eq("token_id", "t1").and("status", "DRAFT").matches(&row));
        assert!(!Filter::eq("token_id", "t1").and("status", "REVIEW").matches(&row));
    }

    #[test]
    fn test_filter_on_absent_field_matches_null() {
        let row = record(json!({ "id": "a" }));
        assert!(Filter::eq("parent", Value::Null).matches(&row));
        assert!(!Filter::eq("parent", "x").matches(&row));
    }

    #[test]
    fn test_table_names() {
        assert_eq!(Table::Tokens.name(), "tokens");
        assert_eq!(
            Table::Extension(TokenStandard::Erc4626).name(),
            "token_erc4626_properties"
        );
        assert_eq!(
            Table::SubResource(SubResourceKind::Erc1400Partitions).to_string(),
            "token_erc1400_partitions"
        );
    }

    #[test]
    fn test_record_id_requires_a_string_id() {
        assert_eq!(record_id(&record(json!({ "id": "x" }))).unwrap(), "x");
        assert!(record_id(&record(json!({ "id": 7 }))).is_err());
    }
}
