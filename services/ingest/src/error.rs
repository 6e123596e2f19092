//! Error types shared by the ingestion pipeline.
//!
//! Classification misses are not errors: every classifier is total and
//! resolves to a default bucket. Everything else that can go wrong while
//! reading a sheet or writing a batch lands in one of the enums below.

use thiserror::Error;

use crate::store::Table;

/// Failure to turn an uploaded file into positional rows.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("failed to open workbook: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("sheet '{0}' not found in workbook")]
    SheetNotFound(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Header narrower than the layout's fixed column positions.
    #[error("layout '{layout}' expects at least {expected} columns, found {found}")]
    Layout {
        layout: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Adapter-level failure from a [`crate::store::Store`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("insert into {table} rejected: {reason}")]
    Rejected { table: Table, reason: String },
}

/// Failures recorded by the orchestrator, plus the fatal configuration
/// and parse errors that abort a run before any row is persisted.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A pre-seeded lookup row (disposition type) does not exist.
    #[error("{table} lookup found nothing for name='{name}' detail_name={detail:?}")]
    LookupNotFound {
        table: Table,
        name: String,
        detail: Option<String>,
    },

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    /// A row is missing a field the destination record requires.
    #[error("malformed group input: missing {field}")]
    MalformedGroupInput { field: &'static str },

    /// The store accepted an insert but returned no identifier.
    #[error("insert into {0} returned no id")]
    MissingId(Table),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Sheet(#[from] SheetError),
}
