//! Entity grouper - folds consecutive sheet rows into nested aggregates.
//!
//! Grouping is a single ordered pass. A new group starts whenever a row's
//! key differs from the key of the row immediately before it, so rows
//! sharing a key but separated by other rows form separate groups. Rows
//! are never re-sorted.

use crate::classify::{
    classify_agency, classify_disposition, classify_report_type, split_person_role, UNIDENTIFIED,
};
use crate::model::{
    Accusation, AccusationGroup, AccusedPerson, Business, Case, CaseGroup, Cell, Disposition,
    Person, ReportDisposition, ReportEntry, SheetRow,
};

/// Behaviour switches for grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupingOptions {
    /// Fold every unidentified person in a case into one [`Person`].
    pub merge_unidentified_persons: bool,
}

impl Default for GroupingOptions {
    fn default() -> Self {
        Self {
            merge_unidentified_persons: true,
        }
    }
}

/// Row-at-a-time reducer with an explicit flush contract.
pub trait Grouper {
    type Group;

    /// Feed one row; returns the previous group if this row closed it.
    fn push(&mut self, row: &SheetRow) -> Option<Self::Group>;

    /// Flush the pending group at end of input.
    fn finish(&mut self) -> Option<Self::Group>;
}

/// Drive `grouper` over `rows`, collecting every emitted group.
pub fn group_rows<G: Grouper>(mut grouper: G, rows: &[SheetRow]) -> Vec<G::Group> {
    let mut groups = Vec::new();
    for row in rows {
        if let Some(group) = grouper.push(row) {
            groups.push(group);
        }
    }
    if let Some(group) = grouper.finish() {
        groups.push(group);
    }
    groups
}

/// Grouping state carried between rows.
#[derive(Debug)]
enum State<G> {
    NoGroup,
    InGroup {
        /// Key cell of the most recent row, not of the group's first row.
        prev_key: Cell,
        current: G,
    },
}

impl<G> Default for State<G> {
    fn default() -> Self {
        State::NoGroup
    }
}

impl<G> State<G> {
    /// Merge `row` into the open group when keys match, otherwise swap in
    /// a fresh group built by `start` and hand back the closed one.
    fn advance(
        &mut self,
        key: Cell,
        merge: impl FnOnce(&mut G),
        start: impl FnOnce() -> G,
    ) -> Option<G> {
        match self {
            State::InGroup { prev_key, current } if *prev_key == key => {
                merge(current);
                *prev_key = key;
                None
            }
            _ => {
                let previous = std::mem::replace(
                    self,
                    State::InGroup {
                        prev_key: key,
                        current: start(),
                    },
                );
                previous.into_group()
            }
        }
    }

    fn into_group(self) -> Option<G> {
        match self {
            State::NoGroup => None,
            State::InGroup { current, .. } => Some(current),
        }
    }

    fn take(&mut self) -> Option<G> {
        std::mem::take(self).into_group()
    }
}

// =============================================================================
// CASE DISPOSITION LAYOUT
// =============================================================================

mod case_col {
    pub const BUSINESS_NAME: usize = 0;
    pub const PERSON_NAME: usize = 1;
    pub const ROLE: usize = 2;
    pub const CASE_NUMBER: usize = 3;
    pub const DISPOSAL_DATE: usize = 4;
    pub const OFFICE: usize = 5;
    pub const OFFICE_DEPT: usize = 6;
    pub const OFFICER: usize = 7;
    pub const OFFICE_TEL: usize = 8;
    pub const CHARGE: usize = 9;
    pub const CHARGE_DETAIL: usize = 10;
    pub const DISPOSITION: usize = 11;
    pub const DISPOSITION_DETAIL: usize = 12;
    pub const FINE_AMOUNT: usize = 13;
    pub const MEMO: usize = 14;
}

/// Groups case-disposition rows into case → persons → dispositions.
#[derive(Debug, Default)]
pub struct CaseGrouper {
    options: GroupingOptions,
    state: State<CaseGroup>,
}

impl CaseGrouper {
    pub fn new(options: GroupingOptions) -> Self {
        Self {
            options,
            state: State::NoGroup,
        }
    }
}

impl Grouper for CaseGrouper {
    type Group = CaseGroup;

    fn push(&mut self, row: &SheetRow) -> Option<CaseGroup> {
        let key = row.cell(case_col::CASE_NUMBER).clone();
        let merge_unidentified = self.options.merge_unidentified_persons;
        self.state.advance(
            key,
            |group| add_person_disposition(&mut group.persons, row, merge_unidentified),
            || CaseGroup {
                case: case_from_row(row),
                persons: vec![person_from_row(row)],
            },
        )
    }

    fn finish(&mut self) -> Option<CaseGroup> {
        self.state.take()
    }
}

fn case_from_row(row: &SheetRow) -> Case {
    let office = row.text(case_col::OFFICE);
    Case {
        number: row.cell(case_col::CASE_NUMBER).clone(),
        agency: classify_agency(&office),
        office,
        office_dept: row.text(case_col::OFFICE_DEPT),
        office_tel: row.text(case_col::OFFICE_TEL),
        officer: row.text(case_col::OFFICER),
        memo: row.text(case_col::MEMO),
    }
}

fn person_name(row: &SheetRow) -> String {
    let cell = row.cell(case_col::PERSON_NAME);
    if cell.is_blank() {
        UNIDENTIFIED.to_string()
    } else {
        cell.as_text()
    }
}

fn person_from_row(row: &SheetRow) -> Person {
    Person {
        business_name: row.text(case_col::BUSINESS_NAME),
        name: person_name(row),
        role: row.text(case_col::ROLE),
        dispositions: vec![disposition_from_row(row)],
    }
}

fn disposition_from_row(row: &SheetRow) -> Disposition {
    let fine = row.cell(case_col::FINE_AMOUNT);
    Disposition {
        charge: row.text(case_col::CHARGE),
        charge_detail: row.text(case_col::CHARGE_DETAIL),
        disposition: row.text(case_col::DISPOSITION),
        disposition_detail: row.text(case_col::DISPOSITION_DETAIL),
        disposal_date: row.cell(case_col::DISPOSAL_DATE).clone(),
        fine_amount: if fine.is_falsy() {
            Cell::Number(0.0)
        } else {
            fine.clone()
        },
    }
}

/// Linear scan by exact name; first match receives the disposition.
fn add_person_disposition(persons: &mut Vec<Person>, row: &SheetRow, merge_unidentified: bool) {
    let name = person_name(row);
    let mergeable = merge_unidentified || name != UNIDENTIFIED;
    if mergeable {
        if let Some(person) = persons.iter_mut().find(|p| p.name == name) {
            person.dispositions.push(disposition_from_row(row));
            return;
        }
    }
    persons.push(person_from_row(row));
}

// =============================================================================
// ACCUSATION LAYOUT
// =============================================================================

mod accusation_col {
    pub const BUSINESS_NAME: usize = 0;
    pub const PERSON: usize = 2;
    pub const CHARGE: usize = 3;
    pub const CATEGORY: usize = 4;
    pub const ACCUSED_AT: usize = 5;
    pub const ADDRESS: usize = 6;
    pub const OFFICE: usize = 7;
}

/// Groups accusation rows into business → accusation.
#[derive(Debug, Default)]
pub struct AccusationGrouper {
    state: State<AccusationGroup>,
}

impl AccusationGrouper {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Grouper for AccusationGrouper {
    type Group = AccusationGroup;

    fn push(&mut self, row: &SheetRow) -> Option<AccusationGroup> {
        let key = row.cell(accusation_col::BUSINESS_NAME).clone();
        self.state.advance(
            key,
            |group| {
                let accusation = &mut group.accusations;
                accusation.accused_person.push(accused_person(row));
                let charge = row.text(accusation_col::CHARGE);
                if !accusation.charge.contains(&charge) {
                    accusation.charge.push(charge);
                }
            },
            || AccusationGroup {
                business: Business::new(
                    row.text(accusation_col::BUSINESS_NAME),
                    row.text(accusation_col::CATEGORY),
                    row.text(accusation_col::ADDRESS),
                ),
                accusations: Accusation {
                    accused_at: row.cell(accusation_col::ACCUSED_AT).clone(),
                    office: row.text(accusation_col::OFFICE),
                    accused_person: vec![accused_person(row)],
                    charge: vec![row.text(accusation_col::CHARGE)],
                },
            },
        )
    }

    fn finish(&mut self) -> Option<AccusationGroup> {
        self.state.take()
    }
}

fn accused_person(row: &SheetRow) -> AccusedPerson {
    let (name, role) = split_person_role(&row.text(accusation_col::PERSON));
    AccusedPerson { name, role }
}

// =============================================================================
// REPORT LAYOUT (one entry per row)
// =============================================================================

mod report_col {
    pub const REPORTED_AT: usize = 0;
    pub const REPORTED_TO: usize = 1;
    pub const NUMBER: usize = 2;
    pub const BUSINESS_NAME: usize = 3;
    pub const ADDRESS: usize = 5;
    pub const CONTENT_BODY: usize = 6;
    pub const REPORT_TYPE: usize = 7;
    pub const CATEGORY: usize = 8;
    pub const OFFICE: usize = 9;
    pub const OFFICE_DEPT: usize = 10;
    pub const OFFICER: usize = 11;
    pub const OFFICE_TEL: usize = 12;
    pub const DISPOSITION: usize = 13;
    pub const DISPOSITION_BODY: usize = 14;
    pub const RECEIVED_AT: usize = 15;
}

pub fn report_from_row(row: &SheetRow) -> ReportEntry {
    ReportEntry {
        reported_at: row.cell(report_col::REPORTED_AT).clone(),
        reported_to: row.text(report_col::REPORTED_TO),
        number: row.text(report_col::NUMBER),
        content_body: row.text(report_col::CONTENT_BODY),
        report_type_id: classify_report_type(&row.text(report_col::REPORT_TYPE)),
        disposition: ReportDisposition {
            office: row.text(report_col::OFFICE),
            office_dept: row.text(report_col::OFFICE_DEPT),
            officer: row.text(report_col::OFFICER),
            office_tel: row.text(report_col::OFFICE_TEL),
            received_at: row.cell(report_col::RECEIVED_AT).clone(),
            disposition_id: classify_disposition(&row.text(report_col::DISPOSITION)),
            content_body: row.text(report_col::DISPOSITION_BODY),
        },
        business: Business::new(
            row.text(report_col::BUSINESS_NAME),
            row.text(report_col::CATEGORY),
            row.text(report_col::ADDRESS),
        ),
    }
}

pub fn group_cases(rows: &[SheetRow], options: GroupingOptions) -> Vec<CaseGroup> {
    group_rows(CaseGrouper::new(options), rows)
}

pub fn group_accusations(rows: &[SheetRow]) -> Vec<AccusationGroup> {
    group_rows(AccusationGrouper::new(), rows)
}

pub fn map_reports(rows: &[SheetRow]) -> Vec<ReportEntry> {
    rows.iter().map(report_from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Agency, BusinessKind};

    fn case_row(case: &str, business: &str, name: &str, role: &str, charge: &str, fine: Cell) -> SheetRow {
        let mut cells = vec![Cell::Empty; 15];
        cells[case_col::BUSINESS_NAME] = Cell::text(business);
        if !name.is_empty() {
            cells[case_col::PERSON_NAME] = Cell::text(name);
        }
        cells[case_col::ROLE] = Cell::text(role);
        cells[case_col::CASE_NUMBER] = Cell::text(case);
        cells[case_col::DISPOSAL_DATE] = Cell::text("2024-03-01");
        cells[case_col::OFFICE] = Cell::text("서울중앙지방검찰청");
        cells[case_col::CHARGE] = Cell::text(charge);
        cells[case_col::DISPOSITION] = Cell::text("구약식");
        cells[case_col::FINE_AMOUNT] = fine;
        SheetRow::new(2, cells)
    }

    fn simple(case: &str, name: &str, charge: &str) -> SheetRow {
        case_row(case, "가게", name, "대표", charge, Cell::Empty)
    }

    fn accusation_row(business: &str, person: &str, charge: &str) -> SheetRow {
        let mut cells = vec![Cell::Empty; 8];
        cells[accusation_col::BUSINESS_NAME] = Cell::text(business);
        cells[accusation_col::PERSON] = Cell::text(person);
        cells[accusation_col::CHARGE] = Cell::text(charge);
        cells[accusation_col::CATEGORY] = Cell::text("오피");
        cells[accusation_col::ACCUSED_AT] = Cell::text("2024-02-01");
        cells[accusation_col::ADDRESS] = Cell::text("https://op.example");
        cells[accusation_col::OFFICE] = Cell::text("강남경찰서");
        SheetRow::new(2, cells)
    }

    /// Number of maximal runs of equal adjacent keys.
    fn runs(keys: &[&str]) -> usize {
        keys.iter()
            .enumerate()
            .filter(|(i, k)| *i == 0 || keys[i - 1] != **k)
            .count()
    }

    // -------------------------------------------------------------------------
    // STATE MACHINE CONTRACT
    // -------------------------------------------------------------------------

    #[test]
    fn test_empty_input_yields_no_groups() {
        assert!(group_cases(&[], GroupingOptions::default()).is_empty());
        assert!(group_accusations(&[]).is_empty());
        assert!(map_reports(&[]).is_empty());
    }

    #[test]
    fn test_push_emits_on_boundary_and_finish_flushes() {
        let mut grouper = CaseGrouper::new(GroupingOptions::default());
        assert!(grouper.push(&simple("101", "김철수", "A")).is_none());
        assert!(grouper.push(&simple("101", "이영희", "A")).is_none());

        let closed = grouper.push(&simple("102", "박민수", "B")).unwrap();
        assert_eq!(closed.case.number, Cell::text("101"));
        assert_eq!(closed.persons.len(), 2);

        let last = grouper.finish().unwrap();
        assert_eq!(last.case.number, Cell::text("102"));
        assert!(grouper.finish().is_none());
    }

    #[test]
    fn test_finish_without_rows_is_none() {
        let mut grouper = AccusationGrouper::new();
        assert!(grouper.finish().is_none());
    }

    // -------------------------------------------------------------------------
    // CASE GROUPING
    // -------------------------------------------------------------------------

    #[test]
    fn test_single_case_two_persons() {
        let rows = vec![
            case_row("101", "가게A", "김철수", "대표", "성매매알선", Cell::Empty),
            case_row("101", "가게B", "이영희", "종업원", "성매매알선", Cell::Empty),
        ];
        let groups = group_cases(&rows, GroupingOptions::default());

        assert_eq!(groups.len(), 1);
        let case = &groups[0];
        assert_eq!(case.case.agency, Agency::Prosecutor);
        assert_eq!(case.persons.len(), 2);
        assert_eq!(case.persons[0].name, "김철수");
        assert_eq!(case.persons[0].business_name, "가게A");
        assert_eq!(case.persons[1].name, "이영희");
        assert_eq!(case.persons[1].business_name, "가게B");
        assert!(case.persons.iter().all(|p| p.dispositions.len() == 1));
    }

    #[test]
    fn test_boundary_counts_runs_not_distinct_keys() {
        let keys = ["101", "101", "102", "101", "103", "103", "101"];
        let rows: Vec<SheetRow> = keys.iter().map(|k| simple(k, "김철수", "A")).collect();
        let groups = group_cases(&rows, GroupingOptions::default());

        assert_eq!(groups.len(), runs(&keys));
        assert_eq!(groups.len(), 5);
        let numbers: Vec<String> = groups.iter().map(|g| g.case.number.as_text()).collect();
        assert_eq!(numbers, vec!["101", "102", "101", "103", "101"]);
    }

    #[test]
    fn test_boundary_compares_previous_row_key() {
        // Numeric and text keys never compare equal.
        let mut a = simple("101", "김철수", "A");
        a.cells[case_col::CASE_NUMBER] = Cell::Number(101.0);
        let b = simple("101", "김철수", "B");
        let groups = group_cases(&[a, b], GroupingOptions::default());
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_first_row_with_blank_case_number_starts_group() {
        let rows = vec![simple("", "김철수", "A"), simple("", "김철수", "B")];
        let groups = group_cases(&rows, GroupingOptions::default());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].persons[0].dispositions.len(), 2);
    }

    #[test]
    fn test_disposition_order_preserved_per_person() {
        let rows = vec![
            simple("101", "김철수", "C1"),
            simple("101", "이영희", "C2"),
            simple("101", "김철수", "C3"),
            simple("101", "김철수", "C4"),
            simple("102", "김철수", "C5"),
        ];
        let groups = group_cases(&rows, GroupingOptions::default());

        let kim = &groups[0].persons[0];
        let charges: Vec<&str> = kim.dispositions.iter().map(|d| d.charge.as_str()).collect();
        assert_eq!(charges, vec!["C1", "C3", "C4"]);
        assert_eq!(groups[0].persons[1].dispositions[0].charge, "C2");
        assert_eq!(groups[1].persons[0].dispositions[0].charge, "C5");
    }

    #[test]
    fn test_person_business_name_taken_from_first_row() {
        let rows = vec![
            case_row("101", "가게A", "김철수", "대표", "A", Cell::Empty),
            case_row("101", "가게B", "김철수", "대표", "B", Cell::Empty),
        ];
        let groups = group_cases(&rows, GroupingOptions::default());
        assert_eq!(groups[0].persons.len(), 1);
        assert_eq!(groups[0].persons[0].business_name, "가게A");
    }

    #[test]
    fn test_fine_amount_defaults_to_zero() {
        let rows = vec![
            case_row("101", "가게", "a", "r", "A", Cell::Empty),
            case_row("101", "가게", "b", "r", "A", Cell::text(" ")),
            case_row("101", "가게", "c", "r", "A", Cell::Number(0.0)),
            case_row("101", "가게", "d", "r", "A", Cell::Number(3_000_000.0)),
            case_row("101", "가게", "e", "r", "A", Cell::text("300만원")),
        ];
        let groups = group_cases(&rows, GroupingOptions::default());
        let fines: Vec<Cell> = groups[0]
            .persons
            .iter()
            .map(|p| p.dispositions[0].fine_amount.clone())
            .collect();
        assert_eq!(
            fines,
            vec![
                Cell::Number(0.0),
                Cell::Number(0.0),
                Cell::Number(0.0),
                Cell::Number(3_000_000.0),
                Cell::text("300만원"),
            ]
        );
    }

    #[test]
    fn test_sentinel_names_merge_by_default() {
        let rows = vec![simple("101", "", "A"), simple("101", "", "B")];
        let groups = group_cases(&rows, GroupingOptions::default());
        assert_eq!(groups[0].persons.len(), 1);
        assert_eq!(groups[0].persons[0].name, UNIDENTIFIED);
        assert_eq!(groups[0].persons[0].dispositions.len(), 2);
    }

    #[test]
    fn test_sentinel_names_kept_apart_when_configured() {
        let options = GroupingOptions {
            merge_unidentified_persons: false,
        };
        let rows = vec![
            simple("101", "", "A"),
            simple("101", "", "B"),
            simple("101", "김철수", "C"),
            simple("101", "김철수", "D"),
        ];
        let groups = group_cases(&rows, options);
        let persons = &groups[0].persons;
        assert_eq!(persons.len(), 3);
        assert_eq!(persons[0].name, UNIDENTIFIED);
        assert_eq!(persons[1].name, UNIDENTIFIED);
        assert_eq!(persons[2].dispositions.len(), 2);
    }

    #[test]
    fn test_case_fields_come_from_first_row() {
        let mut first = simple("101", "김철수", "A");
        first.cells[case_col::MEMO] = Cell::text("첫 메모");
        first.cells[case_col::OFFICE_TEL] = Cell::Number(215551234.0);
        let mut second = simple("101", "김철수", "B");
        second.cells[case_col::MEMO] = Cell::text("둘째 메모");

        let groups = group_cases(&[first, second], GroupingOptions::default());
        assert_eq!(groups[0].case.memo, "첫 메모");
        assert_eq!(groups[0].case.office_tel, "215551234");
    }

    // -------------------------------------------------------------------------
    // ACCUSATION GROUPING
    // -------------------------------------------------------------------------

    #[test]
    fn test_accusation_charges_deduplicated_in_first_seen_order() {
        let rows = vec![
            accusation_row("가게", "대표(김철수)", "성매매알선"),
            accusation_row("가게", "실장(이영희)", "청소년보호법위반"),
            accusation_row("가게", "종업원(박민수)", "성매매알선"),
            accusation_row("가게", "종업원", "청소년보호법위반"),
        ];
        let groups = group_accusations(&rows);

        assert_eq!(groups.len(), 1);
        let accusation = &groups[0].accusations;
        assert_eq!(accusation.charge, vec!["성매매알선", "청소년보호법위반"]);
        assert_eq!(accusation.accused_person.len(), 4);
        assert_eq!(accusation.accused_person[3].name, UNIDENTIFIED);
        assert_eq!(accusation.accused_person[3].role, "종업원");
    }

    #[test]
    fn test_accused_persons_not_deduplicated() {
        let rows = vec![
            accusation_row("가게", "대표(김철수)", "A"),
            accusation_row("가게", "대표(김철수)", "A"),
        ];
        let groups = group_accusations(&rows);
        assert_eq!(groups[0].accusations.accused_person.len(), 2);
        assert_eq!(groups[0].accusations.charge.len(), 1);
    }

    #[test]
    fn test_accusation_boundary_on_business_name() {
        let rows = vec![
            accusation_row("가게A", "대표(김철수)", "A"),
            accusation_row("가게B", "대표(이영희)", "A"),
            accusation_row("가게A", "대표(박민수)", "A"),
        ];
        let groups = group_accusations(&rows);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].business.name, "가게A");
        assert_eq!(groups[0].business.kind, BusinessKind::Online);
        assert_eq!(groups[2].business.name, "가게A");
    }

    // -------------------------------------------------------------------------
    // REPORTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_report_row_mapping() {
        let mut cells = vec![Cell::Empty; 16];
        cells[report_col::REPORTED_AT] = Cell::text("2024-04-01");
        cells[report_col::REPORTED_TO] = Cell::text("경찰청");
        cells[report_col::NUMBER] = Cell::Number(7.0);
        cells[report_col::BUSINESS_NAME] = Cell::text("가게");
        cells[report_col::ADDRESS] = Cell::text("대구시 중구");
        cells[report_col::REPORT_TYPE] = Cell::text("성매매 업소 운영");
        cells[report_col::CATEGORY] = Cell::text("노래방");
        cells[report_col::DISPOSITION] = Cell::text("단속 예정");
        let entry = report_from_row(&SheetRow::new(2, cells));

        assert_eq!(entry.number, "7");
        assert_eq!(entry.report_type_id, 1);
        assert_eq!(entry.disposition.disposition_id, Some(29));
        assert_eq!(entry.disposition.received_at, Cell::Empty);
        assert_eq!(entry.business.kind, BusinessKind::Offline);
        assert_eq!(entry.business.category, "노래방");
    }
}
