//! Reconciliation engine for tasksync.
//!
//! Pulls events from a calendar feed and brings a tabular row store in line
//! with them: new events become rows, events whose start or end moved get
//! their row rewritten, and everything else is left alone.
//!
//! - `normalize` turns feed records into six-field `NormalizedEvent`s
//! - `index` and `diff` classify them against the persisted rows
//! - `apply` writes the result back and logs a run summary
//! - `reconcile` ties one run together
//! - `feed` and `store` hold the collaborator traits and their implementations

pub mod apply;
pub mod diff;
pub mod error;
pub mod event;
pub mod feed;
pub mod index;
pub mod normalize;
pub mod reconcile;
pub mod store;

pub use error::{FeedError, StoreError, SyncError, SyncResult};
pub use event::*;
pub use reconcile::{RunOutcome, SyncContext, SyncPlan};
