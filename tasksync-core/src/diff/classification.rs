use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::diff::ChangeKind;
use crate::event::{NormalizedEvent, PersistedRow};
use crate::index::IdentityIndex;

/// An incoming event whose start or end moved, paired with the row it replaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedEvent {
    pub event: NormalizedEvent,
    pub previous: PersistedRow,
}

/// Result of classifying one run's events. Lists keep feed order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub new: Vec<NormalizedEvent>,
    pub changed: Vec<ChangedEvent>,
    pub unchanged: Vec<String>,
}

impl Classification {
    /// True when nothing needs to be written.
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.changed.is_empty()
    }

    pub fn new_identities(&self) -> Vec<&str> {
        self.new.iter().map(|e| e.identity.as_str()).collect()
    }

    pub fn changed_identities(&self) -> Vec<&str> {
        self.changed.iter().map(|c| c.event.identity.as_str()).collect()
    }
}

/// Sort every event into new, changed or unchanged.
pub fn classify(
    events: impl IntoIterator<Item = NormalizedEvent>,
    index: &IdentityIndex,
) -> Classification {
    let mut result = Classification::default();

    for event in events {
        let previous = index.get(&event.identity);

        match ChangeKind::of(previous, &event) {
            ChangeKind::New => {
                info!(identity = %event.identity, "new event");
                result.new.push(event);
            }
            ChangeKind::Changed => {
                // ChangeKind::of only reports Changed for a present row
                let Some(previous) = previous else { continue };
                info!(identity = %event.identity, "updated event");
                debug!(
                    identity = %event.identity,
                    old_start = %previous.start,
                    new_start = %event.start,
                    old_end = %previous.end,
                    new_end = %event.end,
                    "start/end drift"
                );
                result.changed.push(ChangedEvent {
                    event,
                    previous: previous.clone(),
                });
            }
            ChangeKind::Unchanged => {
                debug!(identity = %event.identity, "skipping existing event");
                result.unchanged.push(event.identity);
            }
        }
    }

    result
}
