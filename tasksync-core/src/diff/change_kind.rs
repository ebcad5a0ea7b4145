use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::{NormalizedEvent, PersistedRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    New,
    Changed,
    Unchanged,
}

impl ChangeKind {
    /// Decide what an incoming event means for the row stored under its identity.
    ///
    /// Only start/end drift counts as a change; title, category and link
    /// differences leave the row alone.
    pub fn of(previous: Option<&PersistedRow>, event: &NormalizedEvent) -> Self {
        match previous {
            None => ChangeKind::New,
            Some(row) if row.start == event.start && row.end == event.end => ChangeKind::Unchanged,
            Some(_) => ChangeKind::Changed,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ChangeKind::New => "+",
            ChangeKind::Changed => "~",
            ChangeKind::Unchanged => "=",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}
