//! Event and row types.
//!
//! `RawEvent` is what a feed source hands over, `NormalizedEvent` is the
//! canonical six-field form the reconciliation works with, and `PersistedRow`
//! is the store's view of a previously synced event.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of the feed's container pseudo-record (calendar metadata, not an event).
pub const CONTAINER_IDENTITY: &str = "vcalendar";

/// Category used when a summary carries no bracketed tag.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Number of columns in a persisted event row.
pub const ROW_WIDTH: usize = 6;

/// One record as delivered by a feed source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub uid: String,
    pub summary: Option<String>,
    pub start: Option<RawTimestamp>,
    pub end: Option<RawTimestamp>,
    /// Either a plain string or a structured value with a `val` string field.
    pub url: Option<serde_json::Value>,
}

impl RawEvent {
    pub fn is_container(&self) -> bool {
        self.uid == CONTAINER_IDENTITY
    }
}

/// A start/end value as the feed expressed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawTimestamp {
    Utc(DateTime<Utc>),
    Floating(NaiveDateTime),
    Zoned {
        datetime: NaiveDateTime,
        tzid: String,
    },
    Date(NaiveDate),
    /// Text the feed parser could not interpret.
    Unparsed(String),
}

/// Canonical event tuple used throughout reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub identity: String,
    pub title: String,
    pub category: String,
    pub start: String,
    pub end: String,
    pub link: String,
}

impl NormalizedEvent {
    /// Column order: identity, title, category, start, end, link.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.identity.clone(),
            self.title.clone(),
            self.category.clone(),
            self.start.clone(),
            self.end.clone(),
            self.link.clone(),
        ]
    }
}

impl fmt::Display for NormalizedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.title.is_empty() {
            write!(f, "{}", self.identity)
        } else {
            write!(f, "{} [{}]", self.title, self.category)
        }
    }
}

/// Position of a row inside its sheet (1-based, header is row 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowRef(pub usize);

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}", self.0)
    }
}

/// A previously synced event as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRow {
    pub row: RowRef,
    pub identity: String,
    pub title: String,
    pub category: String,
    pub start: String,
    pub end: String,
    pub link: String,
}

impl PersistedRow {
    /// Build a row from raw cell values, padding missing trailing cells.
    pub fn from_cells(row: RowRef, cells: &[String]) -> Self {
        let cell = |i: usize| cells.get(i).cloned().unwrap_or_default();
        PersistedRow {
            row,
            identity: cell(0),
            title: cell(1),
            category: cell(2),
            start: cell(3),
            end: cell(4),
            link: cell(5),
        }
    }

    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.identity.clone(),
            self.title.clone(),
            self.category.clone(),
            self.start.clone(),
            self.end.clone(),
            self.link.clone(),
        ]
    }

    /// Overwrite the tracked fields with an incoming event. The link is left as stored.
    pub fn overwrite_from(&mut self, event: &NormalizedEvent) {
        self.identity = event.identity.clone();
        self.title = event.title.clone();
        self.category = event.category.clone();
        self.start = event.start.clone();
        self.end = event.end.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cells_pads_short_rows() {
        let cells = vec!["e1".to_string(), "Quiz".to_string()];
        let row = PersistedRow::from_cells(RowRef(2), &cells);

        assert_eq!(row.identity, "e1");
        assert_eq!(row.title, "Quiz");
        assert_eq!(row.link, "");
        assert_eq!(row.to_cells().len(), ROW_WIDTH);
    }

    #[test]
    fn test_overwrite_keeps_link() {
        let mut row = PersistedRow::from_cells(
            RowRef(3),
            &["e1", "Old", "CS101", "a", "b", "https://old"].map(String::from),
        );
        let event = NormalizedEvent {
            identity: "e1".into(),
            title: "New".into(),
            category: "CS 102".into(),
            start: "c".into(),
            end: "d".into(),
            link: "https://new".into(),
        };

        row.overwrite_from(&event);

        assert_eq!(row.title, "New");
        assert_eq!(row.start, "c");
        assert_eq!(row.link, "https://old");
    }
}
