//! Enforcement spreadsheet ingestion.
//!
//! Reads case-disposition, accusation and report sheets, folds adjacent
//! rows into case/person/disposition and business/accusation aggregates,
//! and writes them to a relational store with find-or-create lookups.
//!
//! ```text
//! sheet ──▶ group ──▶ normalize ──▶ orchestrate ──▶ store
//!              ▲
//!          classify
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod group;
pub mod model;
pub mod normalize;
pub mod orchestrate;
pub mod pipeline;
pub mod sheet;
pub mod store;

pub use config::IngestConfig;
pub use error::{IngestError, SheetError, StoreError};
pub use group::GroupingOptions;
pub use model::Grouped;
pub use orchestrate::{BatchReport, Orchestrator};
pub use pipeline::{ingest_bytes, ingest_path, ingest_rows, IngestOutcome};
pub use sheet::SheetLayout;
pub use store::{MemoryStore, PgStore, Store};
