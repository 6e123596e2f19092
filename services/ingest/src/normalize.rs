//! Normalization mapper - grouped aggregates to insert-ready records.
//!
//! Each destination table has its own record type carrying exactly the
//! columns that table stores. Foreign keys are constructor arguments, so
//! a record cannot be built before the ids it depends on exist. Nothing
//! here touches persistence.

use crate::classify::{Agency, BusinessKind};
use crate::model::{
    Accusation, AccusedPerson, Business, Case, Cell, Disposition, Location, Person,
    ReportDisposition, ReportEntry,
};
use crate::store::{Filter, Record, RecordId, Table, Value};

/// Conversion of a typed record into the adapter's column list.
pub trait IntoRecord {
    fn into_record(self) -> Record;
}

// =============================================================================
// CELL CONVERSIONS
// =============================================================================

/// Dates become SQL dates; blanks become NULL; anything else stays text.
pub fn date_value(cell: &Cell) -> Value {
    match cell.as_date() {
        Some(date) => Value::Date(date),
        None if cell.is_blank() => Value::Null,
        None => Value::Text(cell.as_text()),
    }
}

/// Falsy amounts become 0; other values pass through.
pub fn fine_value(cell: &Cell) -> Value {
    match cell {
        c if c.is_falsy() => Value::Int(0),
        Cell::Number(n) if n.fract() == 0.0 => Value::Int(*n as i64),
        Cell::Number(n) => Value::Float(*n),
        other => Value::Text(other.as_text()),
    }
}

/// Blank text means "no value".
fn optional_text(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

// =============================================================================
// LOOKUP KEYS
// =============================================================================

/// Composite `(name, detail_name)` key; `None` detail matches NULL only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupKey {
    pub name: String,
    pub detail_name: Option<String>,
}

impl LookupKey {
    pub fn new(name: impl Into<String>, detail_name: Option<String>) -> Self {
        Self {
            name: name.into(),
            detail_name,
        }
    }

    pub fn filters(&self) -> Vec<Filter> {
        let detail = match &self.detail_name {
            Some(detail) => Filter::Eq("detail_name", Value::Text(detail.clone())),
            None => Filter::IsNull("detail_name"),
        };
        vec![Filter::Eq("name", Value::Text(self.name.clone())), detail]
    }
}

/// Key into `charge_types`.
pub type ChargeKey = LookupKey;
/// Key into `disposition_types`.
pub type DispositionKey = LookupKey;

pub fn charge_key(disposition: &Disposition) -> ChargeKey {
    LookupKey::new(
        disposition.charge.clone(),
        optional_text(&disposition.charge_detail),
    )
}

pub fn disposition_key(disposition: &Disposition) -> DispositionKey {
    LookupKey::new(
        disposition.disposition.clone(),
        optional_text(&disposition.disposition_detail),
    )
}

/// Accusation charges carry no detail.
pub fn accusation_charge_key(label: &str) -> ChargeKey {
    LookupKey::new(label, None)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeTypeRecord(pub ChargeKey);

impl IntoRecord for ChargeTypeRecord {
    fn into_record(self) -> Record {
        Record::new(Table::ChargeTypes)
            .with("name", self.0.name)
            .with("detail_name", self.0.detail_name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BusinessTypeRecord {
    pub name: String,
    pub kind: BusinessKind,
}

impl BusinessTypeRecord {
    pub fn from_business(business: &Business) -> Self {
        Self {
            name: business.category.clone(),
            kind: business.kind,
        }
    }

    pub fn filters(&self) -> Vec<Filter> {
        vec![Filter::Eq("name", Value::Text(self.name.clone()))]
    }
}

impl IntoRecord for BusinessTypeRecord {
    fn into_record(self) -> Record {
        Record::new(Table::BusinessTypes)
            .with("type", self.kind.as_str())
            .with("name", self.name)
    }
}

// =============================================================================
// BUSINESSES
// =============================================================================

/// Business row. `category` is never stored; it resolves to
/// `business_type_id` first.
#[derive(Debug, Clone, PartialEq)]
pub struct BusinessRecord {
    pub name: String,
    details: Option<(BusinessKind, Location, RecordId)>,
}

impl BusinessRecord {
    /// Name-only row used by the case pathway, which has no category data.
    pub fn minimal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            details: None,
        }
    }

    pub fn full(business: &Business, business_type_id: RecordId) -> Self {
        Self {
            name: business.name.clone(),
            details: Some((business.kind, business.location.clone(), business_type_id)),
        }
    }

    pub fn name_filter(name: &str) -> Vec<Filter> {
        vec![Filter::Eq("name", Value::Text(name.to_string()))]
    }
}

impl IntoRecord for BusinessRecord {
    fn into_record(self) -> Record {
        let record = Record::new(Table::Businesses).with("name", self.name);
        match self.details {
            None => record,
            Some((kind, location, business_type_id)) => {
                let record = record.with("type", kind.as_str());
                let record = match location {
                    Location::Url(url) => record.with("url", url),
                    Location::Address(address) => record.with("address", address),
                };
                record.with("business_type_id", business_type_id)
            }
        }
    }
}

// =============================================================================
// CASES
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecord {
    pub number: String,
    pub agency: Agency,
    pub office: String,
    pub office_dept: String,
    pub office_tel: String,
    pub officer: String,
    pub memo: String,
}

impl CaseRecord {
    pub fn from_case(case: &Case) -> Self {
        Self {
            number: case.number.as_text(),
            agency: case.agency,
            office: case.office.clone(),
            office_dept: case.office_dept.clone(),
            office_tel: case.office_tel.clone(),
            officer: case.officer.clone(),
            memo: case.memo.clone(),
        }
    }
}

impl IntoRecord for CaseRecord {
    fn into_record(self) -> Record {
        Record::new(Table::Cases)
            .with("number", self.number)
            .with("agency", self.agency.as_str())
            .with("office", self.office)
            .with("office_dept", self.office_dept)
            .with("office_tel", self.office_tel)
            .with("officer", self.officer)
            .with("memo", self.memo)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CasePersonRecord {
    pub case_id: RecordId,
    pub business_id: RecordId,
    pub name: String,
    pub role: String,
}

impl CasePersonRecord {
    pub fn new(person: &Person, case_id: RecordId, business_id: RecordId) -> Self {
        Self {
            case_id,
            business_id,
            name: person.name.clone(),
            role: person.role.clone(),
        }
    }
}

impl IntoRecord for CasePersonRecord {
    fn into_record(self) -> Record {
        Record::new(Table::CasePersons)
            .with("case_id", self.case_id)
            .with("name", self.name)
            .with("role", self.role)
            .with("business_id", self.business_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CasePersonDispositionRecord {
    pub person_id: RecordId,
    pub charge_id: RecordId,
    pub disposition_id: RecordId,
    pub disposal_date: Value,
    pub fine_amount: Value,
}

impl CasePersonDispositionRecord {
    pub fn new(
        disposition: &Disposition,
        person_id: RecordId,
        charge_id: RecordId,
        disposition_id: RecordId,
    ) -> Self {
        Self {
            person_id,
            charge_id,
            disposition_id,
            disposal_date: date_value(&disposition.disposal_date),
            fine_amount: fine_value(&disposition.fine_amount),
        }
    }
}

impl IntoRecord for CasePersonDispositionRecord {
    fn into_record(self) -> Record {
        Record::new(Table::CasePersonDispositions)
            .with("fine_amount", self.fine_amount)
            .with("person_id", self.person_id)
            .with("disposal_date", self.disposal_date)
            .with("charge_id", self.charge_id)
            .with("disposition_id", self.disposition_id)
    }
}

// =============================================================================
// ACCUSATIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AccusationRecord {
    pub business_id: RecordId,
    pub accused_at: Value,
    pub office: String,
}

impl AccusationRecord {
    pub fn new(accusation: &Accusation, business_id: RecordId) -> Self {
        Self {
            business_id,
            accused_at: date_value(&accusation.accused_at),
            office: accusation.office.clone(),
        }
    }
}

impl IntoRecord for AccusationRecord {
    fn into_record(self) -> Record {
        Record::new(Table::Accusations)
            .with("business_id", self.business_id)
            .with("accused_at", self.accused_at)
            .with("office", self.office)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccusedPersonRecord {
    pub accusation_id: RecordId,
    pub name: String,
    pub role: String,
}

impl AccusedPersonRecord {
    pub fn new(person: &AccusedPerson, accusation_id: RecordId) -> Self {
        Self {
            accusation_id,
            name: person.name.clone(),
            role: person.role.clone(),
        }
    }
}

impl IntoRecord for AccusedPersonRecord {
    fn into_record(self) -> Record {
        Record::new(Table::AccusedPersons)
            .with("accusation_id", self.accusation_id)
            .with("name", self.name)
            .with("role", self.role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccusationChargeRecord {
    pub accusation_id: RecordId,
    pub charge_id: RecordId,
}

impl IntoRecord for AccusationChargeRecord {
    fn into_record(self) -> Record {
        Record::new(Table::AccusationCharges)
            .with("accusation_id", self.accusation_id)
            .with("charge_id", self.charge_id)
    }
}

// =============================================================================
// REPORTS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRecord {
    pub business_id: RecordId,
    pub reported_at: Value,
    pub reported_to: String,
    pub number: String,
    pub content_body: String,
    pub report_type_id: u8,
}

impl ReportRecord {
    pub fn new(report: &ReportEntry, business_id: RecordId) -> Self {
        Self {
            business_id,
            reported_at: date_value(&report.reported_at),
            reported_to: report.reported_to.clone(),
            number: report.number.clone(),
            content_body: report.content_body.clone(),
            report_type_id: report.report_type_id,
        }
    }
}

impl IntoRecord for ReportRecord {
    fn into_record(self) -> Record {
        Record::new(Table::Reports)
            .with("reported_at", self.reported_at)
            .with("reported_to", self.reported_to)
            .with("number", self.number)
            .with("content_body", self.content_body)
            .with("report_type_id", i64::from(self.report_type_id))
            .with("business_id", self.business_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportDispositionRecord {
    pub report_id: RecordId,
    pub office: String,
    pub office_dept: String,
    pub officer: String,
    pub office_tel: String,
    pub received_at: Value,
    pub disposition_id: Option<RecordId>,
    pub content_body: String,
}

impl ReportDispositionRecord {
    /// A report disposition is only stored once it has a received date.
    pub fn is_recorded(disposition: &ReportDisposition) -> bool {
        !disposition.received_at.is_blank()
    }

    pub fn new(disposition: &ReportDisposition, report_id: RecordId) -> Self {
        Self {
            report_id,
            office: disposition.office.clone(),
            office_dept: disposition.office_dept.clone(),
            officer: disposition.officer.clone(),
            office_tel: disposition.office_tel.clone(),
            received_at: date_value(&disposition.received_at),
            disposition_id: disposition.disposition_id,
            content_body: disposition.content_body.clone(),
        }
    }
}

impl IntoRecord for ReportDispositionRecord {
    fn into_record(self) -> Record {
        Record::new(Table::ReportDispositions)
            .with("office", self.office)
            .with("office_dept", self.office_dept)
            .with("officer", self.officer)
            .with("office_tel", self.office_tel)
            .with("received_at", self.received_at)
            .with("disposition_id", self.disposition_id)
            .with("content_body", self.content_body)
            .with("report_id", self.report_id)
    }
}
