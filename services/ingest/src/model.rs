//! Spreadsheet cells and the grouped aggregates built from them.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};

use crate::classify::{classify_address, Agency, BusinessKind};

// =============================================================================
// CELLS AND ROWS
// =============================================================================

/// One spreadsheet cell. Blank cells read as [`Cell::Empty`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDateTime),
}

const TEXT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d", "%Y%m%d"];

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    /// Empty, or text that is only whitespace.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Blank or numeric zero.
    pub fn is_falsy(&self) -> bool {
        self.is_blank() || matches!(self, Cell::Number(n) if *n == 0.0)
    }

    /// Text rendering used for string columns and JSON output.
    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
            Cell::Date(dt) if dt.time() == chrono::NaiveTime::MIN => {
                dt.format("%Y-%m-%d").to_string()
            }
            Cell::Date(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Calendar date held by the cell, if it is a date or date-like text.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Date(dt) => Some(dt.date()),
            Cell::Text(s) => {
                let s = s.trim();
                let head = s.split_whitespace().next().unwrap_or(s);
                TEXT_DATE_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDate::parse_from_str(head, fmt).ok())
            }
            _ => None,
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                serializer.serialize_i64(*n as i64)
            }
            Cell::Number(n) => serializer.serialize_f64(*n),
            other => serializer.serialize_str(&other.as_text()),
        }
    }
}

/// Positional row; column meaning is fixed by the sheet layout.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    /// 1-based line in the source sheet (header is line 1).
    pub line: usize,
    pub cells: Vec<Cell>,
}

static EMPTY_CELL: Cell = Cell::Empty;

impl SheetRow {
    pub fn new(line: usize, cells: Vec<Cell>) -> Self {
        Self { line, cells }
    }

    pub fn cell(&self, index: usize) -> &Cell {
        self.cells.get(index).unwrap_or(&EMPTY_CELL)
    }

    pub fn text(&self, index: usize) -> String {
        self.cell(index).as_text()
    }
}

// =============================================================================
// CASE AGGREGATES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Case {
    pub number: Cell,
    pub agency: Agency,
    pub office: String,
    pub office_dept: String,
    pub office_tel: String,
    pub officer: String,
    pub memo: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Disposition {
    pub charge: String,
    pub charge_detail: String,
    pub disposition: String,
    pub disposition_detail: String,
    pub disposal_date: Cell,
    /// Falsy source values are stored as 0.
    pub fine_amount: Cell,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Person {
    pub business_name: String,
    pub name: String,
    pub role: String,
    pub dispositions: Vec<Disposition>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseGroup {
    pub case: Case,
    pub persons: Vec<Person>,
}

// =============================================================================
// BUSINESS / ACCUSATION / REPORT AGGREGATES
// =============================================================================

/// Where a business can be found; serialized as a `url` or `address` key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Location {
    #[serde(rename = "url")]
    Url(String),
    #[serde(rename = "address")]
    Address(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Business {
    pub name: String,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: BusinessKind,
    #[serde(flatten)]
    pub location: Location,
}

impl Business {
    /// Classifies `address` so that `url` is set iff the business is online.
    pub fn new(name: String, category: String, address: String) -> Self {
        let kind = classify_address(&address);
        let location = match kind {
            BusinessKind::Online => Location::Url(address),
            BusinessKind::Offline => Location::Address(address),
        };
        Self {
            name,
            category,
            kind,
            location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccusedPerson {
    pub name: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Accusation {
    pub accused_at: Cell,
    pub office: String,
    pub accused_person: Vec<AccusedPerson>,
    /// Distinct charge labels in order of first appearance.
    pub charge: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccusationGroup {
    pub business: Business,
    pub accusations: Accusation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportDisposition {
    pub office: String,
    pub office_dept: String,
    pub officer: String,
    pub office_tel: String,
    pub received_at: Cell,
    pub disposition_id: Option<i64>,
    pub content_body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub reported_at: Cell,
    pub reported_to: String,
    pub number: String,
    pub content_body: String,
    pub report_type_id: u8,
    pub disposition: ReportDisposition,
    pub business: Business,
}

/// Output of one grouping pass, one variant per sheet layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Grouped {
    Cases(Vec<CaseGroup>),
    Accusations(Vec<AccusationGroup>),
    Reports(Vec<ReportEntry>),
}

impl Grouped {
    pub fn len(&self) -> usize {
        match self {
            Grouped::Cases(v) => v.len(),
            Grouped::Accusations(v) => v.len(),
            Grouped::Reports(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
