//! Daily log records.
//!
//! One record per calendar date. The derived [`DayState`] follows:
//!
//!   Unset ──intend──> Intended ──close──> Closed
//!     │                  │  │
//!     │                  │  └──rollover──> Missed
//!     └──────skip────────┴──skip──> Skipped
//!
//! Closed, Missed and Skipped are terminal: `closed` is set and normal flow
//! never mutates the record again.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Recorded status of a day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DayStatus {
    Yes,
    Partial,
    No,
    Missed,
    Skipped,
}

impl fmt::Display for DayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DayStatus::Yes => "yes",
            DayStatus::Partial => "partial",
            DayStatus::No => "no",
            DayStatus::Missed => "missed",
            DayStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Outcome a user may report when closing a day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Nailed it
    Yes,
    /// Some progress
    Partial,
    /// Didn't happen
    No,
}

impl From<Outcome> for DayStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Yes => DayStatus::Yes,
            Outcome::Partial => DayStatus::Partial,
            Outcome::No => DayStatus::No,
        }
    }
}

impl FromStr for Outcome {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(Outcome::Yes),
            "partial" => Ok(Outcome::Partial),
            "no" => Ok(Outcome::No),
            other => Err(ValidationError::InvalidValue {
                field: "status".into(),
                message: format!("expected yes, partial or no, got '{other}'"),
            }),
        }
    }
}

/// Lifecycle state derived from a record's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayState {
    Unset,
    Intended,
    Skipped,
    Closed(Outcome),
    Missed,
}

impl DayState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DayState::Unset | DayState::Intended)
    }
}

impl fmt::Display for DayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayState::Unset => f.write_str("unset"),
            DayState::Intended => f.write_str("intended"),
            DayState::Skipped => f.write_str("skipped"),
            DayState::Closed(outcome) => write!(f, "closed ({})", DayStatus::from(*outcome)),
            DayState::Missed => f.write_str("missed"),
        }
    }
}

/// The record for one calendar date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DayLog {
    pub id: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obj_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intention: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DayStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed: Option<DateTime<Utc>>,
    #[serde(default, alias = "created_at", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl DayLog {
    /// A fresh, unset record for `date`.
    pub fn new(date: NaiveDate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date,
            goal_id: None,
            obj_id: None,
            intention: None,
            status: None,
            reflection: None,
            closed: None,
            created_at: Some(Utc::now()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    /// Non-blank intention text, if any.
    pub fn intention_text(&self) -> Option<&str> {
        self.intention
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn has_intention(&self) -> bool {
        self.intention_text().is_some()
    }

    pub fn state(&self) -> DayState {
        if self.is_closed() {
            return match self.status {
                Some(DayStatus::Yes) => DayState::Closed(Outcome::Yes),
                Some(DayStatus::Partial) => DayState::Closed(Outcome::Partial),
                Some(DayStatus::No) => DayState::Closed(Outcome::No),
                Some(DayStatus::Missed) => DayState::Missed,
                // A closed record without status only comes from imports; treat it as a skip.
                Some(DayStatus::Skipped) | None => DayState::Skipped,
            };
        }
        if self.has_intention() {
            DayState::Intended
        } else {
            DayState::Unset
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn state_follows_fields() {
        let mut log = DayLog::new(date("2025-01-10"));
        assert_eq!(log.state(), DayState::Unset);

        log.intention = Some("   ".into());
        assert_eq!(log.state(), DayState::Unset);

        log.intention = Some("Write 500 words".into());
        assert_eq!(log.state(), DayState::Intended);

        log.status = Some(DayStatus::Partial);
        log.closed = Some(Utc::now());
        assert_eq!(log.state(), DayState::Closed(Outcome::Partial));
        assert!(log.state().is_terminal());
    }

    #[test]
    fn serializes_with_camel_case_references() {
        let mut log = DayLog::new(date("2025-01-10"));
        log.goal_id = Some("g".into());
        log.obj_id = Some("o".into());
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["goalId"], "g");
        assert_eq!(json["objId"], "o");
        assert_eq!(json["date"], "2025-01-10");
        assert!(json.get("closed").is_none());
    }

    #[test]
    fn reads_snake_case_created_at() {
        let raw = r#"{"id":"l1","date":"2025-01-10","goalId":"g","created_at":"2025-01-10T08:00:00Z"}"#;
        let log: DayLog = serde_json::from_str(raw).unwrap();
        let expected: DateTime<Utc> = "2025-01-10T08:00:00Z".parse().unwrap();
        assert_eq!(log.created_at, Some(expected));
        assert!(serde_json::to_value(&log).unwrap().get("createdAt").is_some());
    }

    #[test]
    fn outcome_parses_case_insensitively() {
        assert_eq!("YES".parse::<Outcome>().unwrap(), Outcome::Yes);
        assert!("missed".parse::<Outcome>().is_err());
    }
}
