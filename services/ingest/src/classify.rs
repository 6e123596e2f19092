//! Row classifier - derives categorical codes from free-text cells.
//!
//! Every function here is total: an unmatched input resolves to the
//! layout's default bucket instead of an error.

use serde::Serialize;

/// Placeholder name for persons whose name cell is empty or unparseable.
pub const UNIDENTIFIED: &str = "성명불상";

/// Report type assigned when no known phrase matches.
pub const REPORT_TYPE_OTHER: u8 = 5;

/// Whether a business is reached through a URL or a street address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BusinessKind {
    Online,
    Offline,
}

impl BusinessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessKind::Online => "online",
            BusinessKind::Offline => "offline",
        }
    }
}

/// Kind of office that handled a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Agency {
    Court,
    Police,
    Prosecutor,
    Other,
}

impl Agency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Agency::Court => "court",
            Agency::Police => "police",
            Agency::Prosecutor => "prosecutor",
            Agency::Other => "other",
        }
    }
}

/// Checked in order; first hit wins.
const AGENCY_KEYWORDS: &[(&str, Agency)] = &[
    ("법원", Agency::Court),
    ("경찰", Agency::Police),
    ("검찰", Agency::Prosecutor),
];

/// Report disposition phrases mapped to their `disposition_types` ids.
const REPORT_DISPOSITIONS: &[(&str, i64)] = &[
    ("단속예정", 29),
    ("단속완료", 30),
    ("정황없음", 31),
    ("자진정비", 32),
    ("각하(중복)", 33),
    ("각하(미유통)", 51),
    ("확인불가", 34),
    ("접속차단", 35),
    ("청소년유해매체물표시", 36),
    ("처리종결", 52),
];

const REPORT_TYPES: &[(&str, u8)] = &[
    ("성매매업소운영", 1),
    ("성매매알선광고", 2),
    ("성매매구인광고", 3),
    ("불법옥외광고물", 4),
];

const URL_MARKERS: &[&str] = &["https://", "http://"];

pub fn classify_address(text: &str) -> BusinessKind {
    if URL_MARKERS.iter().any(|marker| text.contains(marker)) {
        BusinessKind::Online
    } else {
        BusinessKind::Offline
    }
}

pub fn classify_agency(text: &str) -> Agency {
    AGENCY_KEYWORDS
        .iter()
        .find(|(keyword, _)| text.contains(keyword))
        .map(|(_, agency)| *agency)
        .unwrap_or(Agency::Other)
}

/// Returns `None` for unrecognised text; callers store it as unspecified.
pub fn classify_disposition(text: &str) -> Option<i64> {
    let compact = strip_whitespace(text);
    REPORT_DISPOSITIONS
        .iter()
        .find(|(phrase, _)| compact.contains(phrase))
        .map(|(_, code)| *code)
}

pub fn classify_report_type(text: &str) -> u8 {
    let compact = strip_whitespace(text);
    REPORT_TYPES
        .iter()
        .find(|(phrase, _)| compact.contains(phrase))
        .map(|(_, code)| *code)
        .unwrap_or(REPORT_TYPE_OTHER)
}

/// Splits a `role(name)` cell into `(name, role)`.
///
/// The name is the text after the first `(` up to the next bracket; the
/// role is everything before the first `(`, trimmed. Cells without both
/// brackets (including unbalanced ones like `"홍길동(대표"`) yield the
/// unidentified sentinel and the whole trimmed cell as the role.
pub fn split_person_role(text: &str) -> (String, String) {
    if let (Some(open), true) = (text.find('('), text.contains(')')) {
        let after = &text[open + 1..];
        let name = after
            .split(|c| c == '(' || c == ')')
            .next()
            .unwrap_or_default();
        let role = text[..open].trim();
        return (name.to_string(), role.to_string());
    }
    (UNIDENTIFIED.to_string(), text.trim().to_string())
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}
