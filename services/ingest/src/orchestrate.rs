//! Upsert orchestrator.
//!
//! Resolves foreign keys with find-or-create and inserts grouped aggregates
//! in dependency order. Every store call is awaited before the next one is
//! issued; later inserts need the ids earlier ones return.
//!
//! Find-or-create is a read followed by a conditional write with no
//! transaction around it. Ingestion assumes a single writer: two runs
//! against the same database at once may double-insert lookup rows.
//!
//! Failures never abort a batch. Each one is logged, recorded in the
//! [`BatchReport`], and processing moves on to the next sibling record.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::IngestError;
use crate::model::{AccusationGroup, Business, CaseGroup, Disposition, Person, ReportEntry};
use crate::normalize::{
    accusation_charge_key, charge_key, disposition_key, AccusationChargeRecord, AccusationRecord,
    AccusedPersonRecord, BusinessRecord, BusinessTypeRecord, CasePersonDispositionRecord,
    CasePersonRecord, CaseRecord, ChargeKey, ChargeTypeRecord, DispositionKey, IntoRecord,
    ReportDispositionRecord, ReportRecord,
};
use crate::store::{Record, RecordId, Store, Table};

/// Outcome of persisting one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    /// False as soon as any record failed.
    pub success: bool,
    pub failures: Vec<String>,
    /// Rows written per table.
    pub inserted: BTreeMap<Table, usize>,
}

impl Default for BatchReport {
    fn default() -> Self {
        Self {
            success: true,
            failures: Vec::new(),
            inserted: BTreeMap::new(),
        }
    }
}

impl BatchReport {
    pub fn inserted(&self, table: Table) -> usize {
        self.inserted.get(&table).copied().unwrap_or(0)
    }

    fn record_failure(&mut self, scope: &str, error: &IngestError) {
        warn!(scope, error = %error, "record failed");
        self.success = false;
        self.failures.push(format!("{scope}: {error}"));
    }
}

/// One ingestion run's writer. Lookups are re-queried every time.
pub struct Orchestrator<'s> {
    store: &'s dyn Store,
    report: BatchReport,
}

impl<'s> Orchestrator<'s> {
    pub fn new(store: &'s dyn Store) -> Self {
        Self {
            store,
            report: BatchReport::default(),
        }
    }

    // =========================================================================
    // ENTRY POINTS
    // =========================================================================

    /// Case → Person → Disposition, per case group.
    pub async fn ingest_cases(mut self, groups: &[CaseGroup]) -> BatchReport {
        for group in groups {
            let number = group.case.number.as_text();
            info!(case = %number, persons = group.persons.len(), "ingesting case");

            let scope = format!("case {number}");
            let case_id = match self
                .insert_required(CaseRecord::from_case(&group.case).into_record())
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    self.report.record_failure(&scope, &e);
                    continue;
                }
            };

            for person in &group.persons {
                self.ingest_person(&scope, case_id, person).await;
            }
        }
        self.report
    }

    /// Business → Accusation → Accused persons → Charge links, per group.
    pub async fn ingest_accusations(mut self, groups: &[AccusationGroup]) -> BatchReport {
        for group in groups {
            let scope = format!("accusation for business '{}'", group.business.name);
            info!(
                business = %group.business.name,
                persons = group.accusations.accused_person.len(),
                charges = group.accusations.charge.len(),
                "ingesting accusation"
            );

            let business_id = match self.find_or_create_business(&group.business).await {
                Ok(id) => id,
                Err(e) => {
                    self.report.record_failure(&scope, &e);
                    continue;
                }
            };

            let record = AccusationRecord::new(&group.accusations, business_id).into_record();
            let accusation_id = match self.insert_required(record).await {
                Ok(id) => id,
                Err(e) => {
                    self.report.record_failure(&scope, &e);
                    continue;
                }
            };

            for person in &group.accusations.accused_person {
                let record = AccusedPersonRecord::new(person, accusation_id).into_record();
                if let Err(e) = self.insert_required(record).await {
                    self.report
                        .record_failure(&format!("{scope} / person {}", person.name), &e);
                }
            }

            for label in &group.accusations.charge {
                if let Err(e) = self.link_accusation_charge(accusation_id, label).await {
                    self.report
                        .record_failure(&format!("{scope} / charge {label}"), &e);
                }
            }
        }
        self.report
    }

    /// Business → Report → Report disposition (when received), per row.
    pub async fn ingest_reports(mut self, entries: &[ReportEntry]) -> BatchReport {
        for entry in entries {
            let scope = format!("report {} for business '{}'", entry.number, entry.business.name);
            info!(number = %entry.number, business = %entry.business.name, "ingesting report");

            let business_id = match self.find_or_create_business(&entry.business).await {
                Ok(id) => id,
                Err(e) => {
                    self.report.record_failure(&scope, &e);
                    continue;
                }
            };

            let report_id = match self
                .insert_required(ReportRecord::new(entry, business_id).into_record())
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    self.report.record_failure(&scope, &e);
                    continue;
                }
            };

            if ReportDispositionRecord::is_recorded(&entry.disposition) {
                let record = ReportDispositionRecord::new(&entry.disposition, report_id).into_record();
                if let Err(e) = self.insert_required(record).await {
                    self.report
                        .record_failure(&format!("{scope} / disposition"), &e);
                }
            }
        }
        self.report
    }

    // =========================================================================
    // CASE SUBTREE
    // =========================================================================

    async fn ingest_person(&mut self, case_scope: &str, case_id: RecordId, person: &Person) {
        let scope = format!("{case_scope} / person {}", person.name);

        if person.business_name.trim().is_empty() {
            let e = IngestError::MalformedGroupInput {
                field: "business_name",
            };
            self.report.record_failure(&scope, &e);
            return;
        }

        let person_id = match self.insert_person(case_id, person).await {
            Ok(id) => id,
            Err(e) => {
                self.report.record_failure(&scope, &e);
                return;
            }
        };

        for disposition in &person.dispositions {
            if let Err(e) = self.insert_disposition(person_id, disposition).await {
                let scope = format!("{scope} / charge {}", disposition.charge);
                self.report.record_failure(&scope, &e);
            }
        }
    }

    async fn insert_person(&mut self, case_id: RecordId, person: &Person) -> Result<RecordId, IngestError> {
        let business_id = self.find_or_create_minimal_business(&person.business_name).await?;
        let record = CasePersonRecord::new(person, case_id, business_id).into_record();
        self.insert_required(record).await
    }

    async fn insert_disposition(
        &mut self,
        person_id: RecordId,
        disposition: &Disposition,
    ) -> Result<RecordId, IngestError> {
        let charge_id = self.find_or_create_charge(&charge_key(disposition)).await?;
        let disposition_id = self.find_disposition(&disposition_key(disposition)).await?;
        let record =
            CasePersonDispositionRecord::new(disposition, person_id, charge_id, disposition_id)
                .into_record();
        self.insert_required(record).await
    }

    async fn link_accusation_charge(
        &mut self,
        accusation_id: RecordId,
        label: &str,
    ) -> Result<RecordId, IngestError> {
        let charge_id = self.find_or_create_charge(&accusation_charge_key(label)).await?;
        let record = AccusationChargeRecord {
            accusation_id,
            charge_id,
        }
        .into_record();
        self.insert_required(record).await
    }

    // =========================================================================
    // FIND-OR-CREATE
    // =========================================================================

    /// Case sheets carry no category, so a new business gets a name only.
    async fn find_or_create_minimal_business(&mut self, name: &str) -> Result<RecordId, IngestError> {
        let filters = BusinessRecord::name_filter(name);
        if let Some(id) = self.store.find_one(Table::Businesses, &filters).await? {
            return Ok(id);
        }
        self.insert_required(BusinessRecord::minimal(name).into_record())
            .await
    }

    /// Full business row; its category resolves to a business type first.
    async fn find_or_create_business(&mut self, business: &Business) -> Result<RecordId, IngestError> {
        if business.name.trim().is_empty() {
            return Err(IngestError::MalformedGroupInput {
                field: "business_name",
            });
        }
        let filters = BusinessRecord::name_filter(&business.name);
        if let Some(id) = self.store.find_one(Table::Businesses, &filters).await? {
            return Ok(id);
        }
        let business_type_id = self.find_or_create_business_type(business).await?;
        self.insert_required(BusinessRecord::full(business, business_type_id).into_record())
            .await
    }

    async fn find_or_create_business_type(&mut self, business: &Business) -> Result<RecordId, IngestError> {
        let record = BusinessTypeRecord::from_business(business);
        if let Some(id) = self
            .store
            .find_one(Table::BusinessTypes, &record.filters())
            .await?
        {
            return Ok(id);
        }
        self.insert_required(record.into_record()).await
    }

    async fn find_or_create_charge(&mut self, key: &ChargeKey) -> Result<RecordId, IngestError> {
        if let Some(id) = self.store.find_one(Table::ChargeTypes, &key.filters()).await? {
            return Ok(id);
        }
        self.insert_required(ChargeTypeRecord(key.clone()).into_record())
            .await
    }

    /// Disposition types are pre-seeded; a miss is reported, never created.
    async fn find_disposition(&mut self, key: &DispositionKey) -> Result<RecordId, IngestError> {
        self.store
            .find_one(Table::DispositionTypes, &key.filters())
            .await?
            .ok_or_else(|| IngestError::LookupNotFound {
                table: Table::DispositionTypes,
                name: key.name.clone(),
                detail: key.detail_name.clone(),
            })
    }

    /// Insert and demand an id back. A row accepted without an id still
    /// counts as written.
    async fn insert_required(&mut self, record: Record) -> Result<RecordId, IngestError> {
        let table = record.table;
        let id = self.store.insert(record).await?;
        *self.report.inserted.entry(table).or_default() += 1;
        id.ok_or(IngestError::MissingId(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Agency;
    use crate::model::{Accusation, AccusedPerson, Case, Cell, ReportDisposition};
    use crate::store::{Filter, MemoryStore, Value};

    // -------------------------------------------------------------------------
    // Fixtures
    // -------------------------------------------------------------------------

    fn seed_disposition_type(store: &MemoryStore, name: &str) -> RecordId {
        store.seed(
            Record::new(Table::DispositionTypes)
                .with("name", name)
                .with("detail_name", Value::Null),
        )
    }

    fn disposition(charge: &str, disposition: &str) -> Disposition {
        Disposition {
            charge: charge.into(),
            charge_detail: String::new(),
            disposition: disposition.into(),
            disposition_detail: String::new(),
            disposal_date: Cell::text("2024-03-01"),
            fine_amount: Cell::Number(0.0),
        }
    }

    fn person(business: &str, name: &str, dispositions: Vec<Disposition>) -> Person {
        Person {
            business_name: business.into(),
            name: name.into(),
            role: "대표".into(),
            dispositions,
        }
    }

    fn case_group(number: &str, persons: Vec<Person>) -> CaseGroup {
        CaseGroup {
            case: Case {
                number: Cell::text(number),
                agency: Agency::Prosecutor,
                office: "서울중앙지방검찰청".into(),
                office_dept: String::new(),
                office_tel: String::new(),
                officer: String::new(),
                memo: String::new(),
            },
            persons,
        }
    }

    fn accusation_group(business: &str, charges: &[&str]) -> AccusationGroup {
        AccusationGroup {
            business: Business::new(business.into(), "오피".into(), "https://op.example".into()),
            accusations: Accusation {
                accused_at: Cell::text("2024-02-01"),
                office: "강남경찰서".into(),
                accused_person: vec![
                    AccusedPerson {
                        name: "김철수".into(),
                        role: "운영자".into(),
                    },
                    AccusedPerson {
                        name: "성명불상".into(),
                        role: "광고업자".into(),
                    },
                ],
                charge: charges.iter().map(|c| c.to_string()).collect(),
            },
        }
    }

    fn report_entry(number: &str, business: &str, received_at: Cell) -> ReportEntry {
        ReportEntry {
            reported_at: Cell::text("2024-04-01"),
            reported_to: "경찰청".into(),
            number: number.into(),
            content_body: "광고 신고".into(),
            report_type_id: 2,
            disposition: ReportDisposition {
                office: "강남경찰서".into(),
                office_dept: String::new(),
                officer: String::new(),
                office_tel: String::new(),
                received_at,
                disposition_id: Some(30),
                content_body: String::new(),
            },
            business: Business::new(business.into(), "마사지".into(), "서울시 강남구".into()),
        }
    }

    // -------------------------------------------------------------------------
    // Case pathway
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_single_case_two_persons() {
        let store = MemoryStore::new();
        seed_disposition_type(&store, "구약식");

        let groups = vec![case_group(
            "101",
            vec![
                person("가게", "김철수", vec![disposition("성매매알선", "구약식")]),
                person("가게", "이영희", vec![disposition("성매매알선", "구약식")]),
            ],
        )];
        let report = Orchestrator::new(&store).ingest_cases(&groups).await;

        assert!(report.success, "{:?}", report.failures);
        assert_eq!(store.count(Table::Cases), 1);
        assert_eq!(store.count(Table::CasePersons), 2);
        assert_eq!(store.count(Table::Businesses), 1);
        assert_eq!(store.count(Table::ChargeTypes), 1);
        assert_eq!(store.count(Table::CasePersonDispositions), 2);
        assert_eq!(report.inserted(Table::CasePersonDispositions), 2);
        assert_eq!(report.inserted(Table::DispositionTypes), 0);
    }

    #[tokio::test]
    async fn test_case_business_is_minimal_and_reused() {
        let store = MemoryStore::new();
        seed_disposition_type(&store, "구약식");
        let existing = store.seed(Record::new(Table::Businesses).with("name", "기존업소"));

        let groups = vec![
            case_group("1", vec![person("기존업소", "a", vec![])]),
            case_group("2", vec![person("새업소", "b", vec![])]),
        ];
        let report = Orchestrator::new(&store).ingest_cases(&groups).await;
        assert!(report.success);

        let businesses = store.rows(Table::Businesses);
        assert_eq!(businesses.len(), 2);
        assert_eq!(businesses[1].1.columns, vec![("name", Value::Text("새업소".into()))]);

        let persons = store.rows(Table::CasePersons);
        assert_eq!(persons[0].1.get("business_id"), Some(&Value::Int(existing)));
    }

    #[tokio::test]
    async fn test_missing_disposition_type_is_recorded_and_skipped() {
        let store = MemoryStore::new();
        seed_disposition_type(&store, "구약식");

        let groups = vec![case_group(
            "101",
            vec![person(
                "가게",
                "김철수",
                vec![
                    disposition("성매매알선", "기소유예"),
                    disposition("성매매알선", "구약식"),
                ],
            )],
        )];
        let report = Orchestrator::new(&store).ingest_cases(&groups).await;

        assert!(!report.success);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].contains("기소유예"));
        assert_eq!(store.count(Table::CasePersonDispositions), 1);
        assert_eq!(store.count(Table::DispositionTypes), 1);
    }

    #[tokio::test]
    async fn test_person_insert_failure_skips_only_that_subtree() {
        let store = MemoryStore::new();
        seed_disposition_type(&store, "구약식");
        store.fail_inserts(Table::CasePersons);

        let groups = vec![
            case_group("1", vec![person("가게", "a", vec![disposition("c", "구약식")])]),
            case_group("2", vec![person("가게", "b", vec![disposition("c", "구약식")])]),
        ];
        let report = Orchestrator::new(&store).ingest_cases(&groups).await;

        assert!(!report.success);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(store.count(Table::Cases), 2);
        assert_eq!(store.count(Table::CasePersonDispositions), 0);
    }

    #[tokio::test]
    async fn test_missing_case_id_aborts_case_subtree() {
        let store = MemoryStore::new();
        seed_disposition_type(&store, "구약식");
        store.omit_ids(Table::Cases);

        let groups = vec![case_group("1", vec![person("가게", "a", vec![disposition("c", "구약식")])])];
        let report = Orchestrator::new(&store).ingest_cases(&groups).await;

        assert!(!report.success);
        assert!(report.failures[0].contains("returned no id"));
        assert_eq!(report.inserted(Table::Cases), 1);
        assert_eq!(store.count(Table::CasePersons), 0);
    }

    #[tokio::test]
    async fn test_blank_business_name_skips_person() {
        let store = MemoryStore::new();
        seed_disposition_type(&store, "구약식");

        let groups = vec![case_group(
            "1",
            vec![
                person("  ", "a", vec![disposition("c", "구약식")]),
                person("가게", "b", vec![disposition("c", "구약식")]),
            ],
        )];
        let report = Orchestrator::new(&store).ingest_cases(&groups).await;

        assert!(!report.success);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].contains("business_name"));
        assert_eq!(store.count(Table::CasePersons), 1);
        assert_eq!(store.count(Table::CasePersonDispositions), 1);
    }

    #[tokio::test]
    async fn test_empty_input_is_vacuous_success() {
        let store = MemoryStore::new();
        let report = Orchestrator::new(&store).ingest_cases(&[]).await;
        assert!(report.success);
        assert!(report.failures.is_empty());
        assert!(report.inserted.is_empty());

        let report = Orchestrator::new(&store).ingest_accusations(&[]).await;
        assert!(report.success);
        let report = Orchestrator::new(&store).ingest_reports(&[]).await;
        assert!(report.success);
    }

    // -------------------------------------------------------------------------
    // Find-or-create
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_find_or_create_charge_is_idempotent() {
        let store = MemoryStore::new();
        let mut orchestrator = Orchestrator::new(&store);
        let key = ChargeKey::new("성매매알선", None);

        let first = orchestrator.find_or_create_charge(&key).await.unwrap();
        let second = orchestrator.find_or_create_charge(&key).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.count(Table::ChargeTypes), 1);

        let found = store
            .find_one(Table::ChargeTypes, &[Filter::Eq("name", "성매매알선".into()), Filter::IsNull("detail_name")])
            .await
            .unwrap();
        assert_eq!(found, Some(first));

        let detailed = orchestrator
            .find_or_create_charge(&ChargeKey::new("성매매알선", Some("알선영업".into())))
            .await
            .unwrap();
        assert_ne!(detailed, first);
    }

    #[tokio::test]
    async fn test_find_disposition_never_creates() {
        let store = MemoryStore::new();
        let mut orchestrator = Orchestrator::new(&store);
        let err = orchestrator
            .find_disposition(&DispositionKey::new("혐의없음", None))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::LookupNotFound { table: Table::DispositionTypes, .. }));
        assert_eq!(store.count(Table::DispositionTypes), 0);
    }

    // -------------------------------------------------------------------------
    // Accusation pathway
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_accusation_pathway() {
        let store = MemoryStore::new();
        let seeded = store.seed(
            Record::new(Table::ChargeTypes)
                .with("name", "성매매알선")
                .with("detail_name", Value::Null),
        );

        let groups = vec![accusation_group("오피스텔", &["성매매알선", "광고"])];
        let report = Orchestrator::new(&store).ingest_accusations(&groups).await;

        assert!(report.success, "{:?}", report.failures);
        assert_eq!(store.count(Table::BusinessTypes), 1);
        assert_eq!(store.count(Table::Accusations), 1);
        assert_eq!(store.count(Table::AccusedPersons), 2);
        assert_eq!(store.count(Table::AccusationCharges), 2);
        assert_eq!(store.count(Table::ChargeTypes), 2);

        let business = &store.rows(Table::Businesses)[0].1;
        assert_eq!(business.get("type"), Some(&Value::Text("online".into())));
        assert_eq!(business.get("url"), Some(&Value::Text("https://op.example".into())));
        assert!(business.get("category").is_none());

        let links = store.rows(Table::AccusationCharges);
        assert_eq!(links[0].1.get("charge_id"), Some(&Value::Int(seeded)));
    }

    #[tokio::test]
    async fn test_accusation_reuses_business_and_type() {
        let store = MemoryStore::new();
        let groups = vec![
            accusation_group("오피스텔", &["광고"]),
            accusation_group("오피스텔", &["광고"]),
        ];
        let report = Orchestrator::new(&store).ingest_accusations(&groups).await;

        assert!(report.success);
        assert_eq!(store.count(Table::Businesses), 1);
        assert_eq!(store.count(Table::BusinessTypes), 1);
        assert_eq!(store.count(Table::Accusations), 2);
        assert_eq!(store.count(Table::ChargeTypes), 1);
    }

    #[tokio::test]
    async fn test_accusation_with_blank_business_is_malformed() {
        let store = MemoryStore::new();
        let groups = vec![
            accusation_group(" ", &["광고"]),
            accusation_group("오피스텔", &["광고"]),
        ];
        let report = Orchestrator::new(&store).ingest_accusations(&groups).await;

        assert!(!report.success);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].contains("business_name"));
        assert_eq!(store.count(Table::Businesses), 1);
        assert_eq!(store.count(Table::Accusations), 1);
        assert_eq!(store.count(Table::AccusedPersons), 2);
    }

    #[tokio::test]
    async fn test_missing_accusation_id_aborts_its_subtree() {
        let store = MemoryStore::new();
        store.omit_ids(Table::Accusations);

        let groups = vec![
            accusation_group("오피스텔", &["광고"]),
            accusation_group("마사지샵", &["알선"]),
        ];
        let report = Orchestrator::new(&store).ingest_accusations(&groups).await;

        assert!(!report.success);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().all(|f| f.contains("returned no id")));
        assert_eq!(report.inserted(Table::Accusations), 2);
        assert_eq!(store.count(Table::AccusedPersons), 0);
        assert_eq!(store.count(Table::AccusationCharges), 0);
        assert_eq!(store.count(Table::ChargeTypes), 0);
    }

    #[tokio::test]
    async fn test_charge_link_failure_keeps_siblings() {
        let store = MemoryStore::new();
        store.fail_inserts(Table::AccusationCharges);

        let groups = vec![accusation_group("오피스텔", &["a", "b"])];
        let report = Orchestrator::new(&store).ingest_accusations(&groups).await;

        assert!(!report.success);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(store.count(Table::AccusedPersons), 2);
    }

    // -------------------------------------------------------------------------
    // Report pathway
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_report_pathway() {
        let store = MemoryStore::new();
        let entries = vec![
            report_entry("R-1", "마사지샵", Cell::text("2024-04-03")),
            report_entry("R-2", "마사지샵", Cell::Empty),
        ];
        let report = Orchestrator::new(&store).ingest_reports(&entries).await;

        assert!(report.success, "{:?}", report.failures);
        assert_eq!(store.count(Table::Businesses), 1);
        assert_eq!(store.count(Table::Reports), 2);
        assert_eq!(store.count(Table::ReportDispositions), 1);

        let reports = store.rows(Table::Reports);
        assert_eq!(reports[0].1.get("report_type_id"), Some(&Value::Int(2)));
        let disposition = &store.rows(Table::ReportDispositions)[0].1;
        assert_eq!(disposition.get("disposition_id"), Some(&Value::Int(30)));
        assert_eq!(disposition.get("report_id"), Some(&Value::Int(reports[0].0)));
    }

    #[tokio::test]
    async fn test_report_with_blank_business_is_malformed() {
        let store = MemoryStore::new();
        let entries = vec![
            report_entry("R-1", "", Cell::Empty),
            report_entry("R-2", "가게", Cell::Empty),
        ];
        let report = Orchestrator::new(&store).ingest_reports(&entries).await;

        assert!(!report.success);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(store.count(Table::Reports), 1);
    }
}
