//! Persistence adapter.
//!
//! The orchestrator only needs two calls: look up one row's id by
//! equality / is-null predicates, and insert a row returning its new id.
//! [`PgStore`] talks to Postgres; [`MemoryStore`] keeps tables in process
//! for dry runs and tests.

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::StoreError;

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

/// Identifier assigned by the datastore.
pub type RecordId = i64;

/// Destination tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Businesses,
    BusinessTypes,
    Cases,
    CasePersons,
    CasePersonDispositions,
    ChargeTypes,
    DispositionTypes,
    Accusations,
    AccusedPersons,
    AccusationCharges,
    Reports,
    ReportDispositions,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Businesses => "businesses",
            Table::BusinessTypes => "business_types",
            Table::Cases => "cases",
            Table::CasePersons => "case_person",
            Table::CasePersonDispositions => "case_person_dispositions",
            Table::ChargeTypes => "charge_types",
            Table::DispositionTypes => "disposition_types",
            Table::Accusations => "accusations",
            Table::AccusedPersons => "accused_person",
            Table::AccusationCharges => "accusation_charges",
            Table::Reports => "reports",
            Table::ReportDispositions => "report_dispositions",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column value as bound into SQL.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Lookup predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(&'static str, Value),
    IsNull(&'static str),
}

/// An insert-ready row for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub table: Table,
    pub columns: Vec<(&'static str, Value)>,
}

impl Record {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            columns: Vec::new(),
        }
    }

    pub fn with(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.columns.push((column, value.into()));
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }
}

/// Key lookup and insert over named tables.
///
/// Calls may fail transiently. `insert` returns `Ok(None)` when the
/// datastore accepted the row but reported no identifier.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_one(&self, table: Table, filters: &[Filter]) -> Result<Option<RecordId>, StoreError>;

    async fn insert(&self, record: Record) -> Result<Option<RecordId>, StoreError>;
}
