//! Classification of incoming events against the persisted snapshot.

mod change_kind;
mod classification;

pub use change_kind::ChangeKind;
pub use classification::{ChangedEvent, Classification, classify};
