//! One ingestion run: read, group, and optionally persist.

use std::path::Path;

use serde::Serialize;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::error::IngestError;
use crate::group::{group_accusations, group_cases, map_reports, GroupingOptions};
use crate::model::{Grouped, SheetRow};
use crate::orchestrate::{BatchReport, Orchestrator};
use crate::sheet::{self, SheetLayout};
use crate::store::Store;

/// Result of a run. Parsing and persistence succeed independently.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub run_id: Uuid,
    pub layout: SheetLayout,
    pub parsed: bool,
    /// True when every record landed, or when nothing was persisted.
    pub persisted: bool,
    pub data: Grouped,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<BatchReport>,
}

impl IngestOutcome {
    pub fn failures(&self) -> &[String] {
        self.report
            .as_ref()
            .map(|r| r.failures.as_slice())
            .unwrap_or(&[])
    }
}

pub fn group(rows: &[SheetRow], layout: SheetLayout, options: GroupingOptions) -> Grouped {
    match layout {
        SheetLayout::CaseDisposition => Grouped::Cases(group_cases(rows, options)),
        SheetLayout::Accusation => Grouped::Accusations(group_accusations(rows)),
        SheetLayout::Report => Grouped::Reports(map_reports(rows)),
    }
}

/// Group already-read rows and hand them to `store` when one is given.
pub async fn ingest_rows(
    rows: &[SheetRow],
    layout: SheetLayout,
    store: Option<&dyn Store>,
    options: GroupingOptions,
) -> IngestOutcome {
    let run_id = Uuid::new_v4();
    let span = info_span!("ingest", %run_id, layout = layout.as_str());

    async move {
        let data = group(rows, layout, options);
        info!(rows = rows.len(), groups = data.len(), "grouped rows");

        let report = match store {
            Some(store) => {
                let orchestrator = Orchestrator::new(store);
                let report = match &data {
                    Grouped::Cases(groups) => orchestrator.ingest_cases(groups).await,
                    Grouped::Accusations(groups) => orchestrator.ingest_accusations(groups).await,
                    Grouped::Reports(entries) => orchestrator.ingest_reports(entries).await,
                };
                info!(
                    success = report.success,
                    failures = report.failures.len(),
                    "persisted batch"
                );
                Some(report)
            }
            None => None,
        };

        IngestOutcome {
            run_id,
            layout,
            parsed: true,
            persisted: report.as_ref().map_or(true, |r| r.success),
            data,
            report,
        }
    }
    .instrument(span)
    .await
}

/// Ingest an uploaded file held in memory. Read errors are returned; a
/// persistence failure only clears `persisted`.
pub async fn ingest_bytes(
    bytes: &[u8],
    file_name: &str,
    layout: SheetLayout,
    sheet: Option<&str>,
    store: Option<&dyn Store>,
    options: GroupingOptions,
) -> Result<IngestOutcome, IngestError> {
    let rows = sheet::read_bytes(bytes, file_name, layout, sheet)?;
    Ok(ingest_rows(&rows, layout, store, options).await)
}

pub async fn ingest_path(
    path: &Path,
    layout: SheetLayout,
    sheet: Option<&str>,
    store: Option<&dyn Store>,
    options: GroupingOptions,
) -> Result<IngestOutcome, IngestError> {
    let rows = sheet::read_path(path, layout, sheet)?;
    Ok(ingest_rows(&rows, layout, store, options).await)
}
