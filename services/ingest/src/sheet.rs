//! Sheet reader - turns uploaded xlsx/xls/csv files into positional rows.
//!
//! Only the three enforcement layouts are supported. Columns are read by
//! position, never by header name; the header row is skipped.

use std::io::{Cursor, Read, Seek};
use std::path::Path;
use std::str::FromStr;

use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Reader, Sheets};
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::SheetError;
use crate::model::{Cell, SheetRow};

/// The known spreadsheet layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetLayout {
    /// One row per person/charge disposition, grouped by case number.
    CaseDisposition,
    /// One row per accused person, grouped by business name.
    Accusation,
    /// One row per citizen report.
    Report,
}

impl SheetLayout {
    /// Worksheet the layout is exported under.
    pub fn sheet_name(&self) -> &'static str {
        match self {
            SheetLayout::CaseDisposition => "2024 고발 처분내역",
            SheetLayout::Accusation => "2024 고발",
            SheetLayout::Report => "2024신고",
        }
    }

    /// Columns the layout addresses by position.
    pub fn min_columns(&self) -> usize {
        match self {
            SheetLayout::CaseDisposition => 15,
            SheetLayout::Accusation => 8,
            SheetLayout::Report => 16,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SheetLayout::CaseDisposition => "case",
            SheetLayout::Accusation => "accusation",
            SheetLayout::Report => "report",
        }
    }
}

impl FromStr for SheetLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "case" | "case-disposition" | "case_disposition" => Ok(SheetLayout::CaseDisposition),
            "accusation" => Ok(SheetLayout::Accusation),
            "report" => Ok(SheetLayout::Report),
            other => Err(format!(
                "unknown layout '{}': expected one of case, accusation, report",
                other
            )),
        }
    }
}

/// Detect CSV uploads by extension; everything else goes through calamine.
pub fn is_csv_file(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

/// Read an uploaded file held in memory.
pub fn read_bytes(
    bytes: &[u8],
    file_name: &str,
    layout: SheetLayout,
    sheet: Option<&str>,
) -> Result<Vec<SheetRow>, SheetError> {
    if is_csv_file(file_name) {
        read_csv(bytes, layout)
    } else {
        let workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
        read_sheet(workbook, layout, sheet)
    }
}

/// Read a file from disk.
pub fn read_path(
    path: &Path,
    layout: SheetLayout,
    sheet: Option<&str>,
) -> Result<Vec<SheetRow>, SheetError> {
    let file_name = path.to_string_lossy();
    if is_csv_file(&file_name) {
        let bytes = std::fs::read(path)?;
        read_csv(&bytes, layout)
    } else {
        let workbook = open_workbook_auto(path)?;
        read_sheet(workbook, layout, sheet)
    }
}

// =============================================================================
// XLSX / XLS
// =============================================================================

fn read_sheet<RS: Read + Seek>(
    mut workbook: Sheets<RS>,
    layout: SheetLayout,
    sheet: Option<&str>,
) -> Result<Vec<SheetRow>, SheetError> {
    let sheet_name = sheet.unwrap_or_else(|| layout.sheet_name());
    if !workbook.sheet_names().iter().any(|n| n == sheet_name) {
        return Err(SheetError::SheetNotFound(sheet_name.to_string()));
    }

    let range = workbook.worksheet_range(sheet_name)?;
    let (row_count, col_count) = range.get_size();
    tracing::debug!(sheet = sheet_name, row_count, col_count, "read worksheet");

    let mut rows = range.rows();
    let header = match rows.next() {
        Some(header) => header,
        None => return Ok(Vec::new()),
    };
    check_width(layout, header.len())?;

    Ok(rows
        .enumerate()
        .map(|(idx, row)| SheetRow::new(idx + 2, row.iter().map(cell_from_data).collect()))
        .filter(|row| !row.cells.iter().all(Cell::is_blank))
        .collect())
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) => Cell::Date(value),
            None => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .map(Cell::Date)
            .unwrap_or_else(|_| Cell::Text(s.clone())),
        Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) => Cell::Empty,
    }
}

// =============================================================================
// CSV
// =============================================================================

/// Decode CSV bytes: UTF-8 (BOM stripped), else EUC-KR as written by
/// Korean Excel installs.
pub fn decode_csv_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.strip_prefix('\u{feff}').unwrap_or(s).to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::EUC_KR.decode(bytes);
            decoded.into_owned()
        }
    }
}

fn read_csv(bytes: &[u8], layout: SheetLayout) -> Result<Vec<SheetRow>, SheetError> {
    let content = decode_csv_bytes(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let width = reader.headers()?.len();
    if width == 0 && content.trim().is_empty() {
        return Ok(Vec::new());
    }
    check_width(layout, width)?;

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let row = SheetRow::new(idx + 2, record.iter().map(cell_from_csv).collect());
        if !row.cells.iter().all(Cell::is_blank) {
            rows.push(row);
        }
    }
    Ok(rows)
}

fn cell_from_csv(field: &str) -> Cell {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Cell::Empty;
    }
    if has_leading_zero(trimmed) {
        return Cell::Text(field.to_string());
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => Cell::Number(n),
        _ => Cell::Text(field.to_string()),
    }
}

/// Phone numbers and zero-padded case numbers are identifiers, not numbers.
fn has_leading_zero(text: &str) -> bool {
    let digits = text.strip_prefix(|c| c == '-' || c == '+').unwrap_or(text);
    let mut chars = digits.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('0'), Some(c)) if c.is_ascii_digit()
    )
}

fn check_width(layout: SheetLayout, found: usize) -> Result<(), SheetError> {
    if found < layout.min_columns() {
        return Err(SheetError::Layout {
            layout: layout.as_str(),
            expected: layout.min_columns(),
            found,
        });
    }
    Ok(())
}
