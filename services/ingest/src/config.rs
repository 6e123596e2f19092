use crate::error::IngestError;
use crate::group::GroupingOptions;

/// Ingestion settings read from the environment (`.env` is loaded by the
/// binaries before this runs).
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub db_url: String,
    pub max_connections: u32,
    pub merge_unidentified_persons: bool,
}

impl IngestConfig {
    pub fn from_env() -> Result<Self, IngestError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IngestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_url = lookup("DB_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| IngestError::Config("DB_URL env var missing".to_string()))?;

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                IngestError::Config(format!("DB_MAX_CONNECTIONS is not a number: {raw}"))
            })?,
            None => 5,
        };

        let merge_unidentified_persons = match lookup("MERGE_UNIDENTIFIED_PERSONS") {
            Some(raw) => parse_flag(&raw).ok_or_else(|| {
                IngestError::Config(format!("MERGE_UNIDENTIFIED_PERSONS is not a boolean: {raw}"))
            })?,
            None => true,
        };

        Ok(Self {
            db_url,
            max_connections,
            merge_unidentified_persons,
        })
    }

    pub fn grouping_options(&self) -> GroupingOptions {
        GroupingOptions {
            merge_unidentified_persons: self.merge_unidentified_persons,
        }
    }
}

/// Reads the merge flag alone; used where no database is configured.
pub fn grouping_options_from_env() -> Result<GroupingOptions, IngestError> {
    match std::env::var("MERGE_UNIDENTIFIED_PERSONS") {
        Ok(raw) => parse_flag(&raw)
            .map(|merge_unidentified_persons| GroupingOptions {
                merge_unidentified_persons,
            })
            .ok_or_else(|| {
                IngestError::Config(format!("MERGE_UNIDENTIFIED_PERSONS is not a boolean: {raw}"))
            }),
        Err(_) => Ok(GroupingOptions::default()),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
