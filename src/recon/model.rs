use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which dataset produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Origin {
    Enterprise,
    Copilot,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Enterprise => write!(f, "enterprise"),
            Origin::Copilot => write!(f, "copilot"),
        }
    }
}

/// One licensed or seated user, independent of the API shape it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub source_created_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub origin: Origin,
}

#[cfg(test)]
impl Record {
    pub fn new(key: impl Into<String>, origin: Origin) -> Self {
        Self {
            key: key.into(),
            id: None,
            display_name: None,
            source_created_at: None,
            last_activity_at: None,
            origin,
        }
    }
}

/// Outcome of comparing two keyed record sets. Every bucket keeps the
/// key order of the sequence it was drawn from.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    pub left_only: Vec<Record>,
    pub right_only: Vec<Record>,
    /// Records from the left side whose key is also present on the right.
    pub both: Vec<Record>,
    pub total_left: usize,
    pub total_right: usize,
}
