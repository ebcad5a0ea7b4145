//! One reconciliation run: fetch → snapshot → normalize → classify → write back.

use std::collections::HashMap;

use tracing::{error, info, warn};

use crate::apply::{ApplyOutcome, SyncApplier};
use crate::diff::{Classification, classify};
use crate::error::SyncResult;
use crate::event::{NormalizedEvent, RawEvent};
use crate::feed::FeedSource;
use crate::index::IdentityIndex;
use crate::normalize::Normalizer;
use crate::store::{RowStore, SheetRef};

/// Everything a run needs, built once when the process starts.
pub struct SyncContext {
    feed: Box<dyn FeedSource>,
    store: Box<dyn RowStore>,
    normalizer: Normalizer,
    events_sheet: SheetRef,
    log_sheet: SheetRef,
}

impl SyncContext {
    pub fn new(
        feed: Box<dyn FeedSource>,
        store: Box<dyn RowStore>,
        normalizer: Normalizer,
        events_sheet: SheetRef,
        log_sheet: SheetRef,
    ) -> Self {
        SyncContext {
            feed,
            store,
            normalizer,
            events_sheet,
            log_sheet,
        }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn events_sheet(&self) -> &SheetRef {
        &self.events_sheet
    }

    pub fn log_sheet(&self) -> &SheetRef {
        &self.log_sheet
    }
}

/// Classification of one run before anything is written.
#[derive(Debug)]
pub struct SyncPlan {
    /// Events taken from the feed (container record excluded).
    pub fetched: usize,
    /// Rows in the store snapshot.
    pub persisted: usize,
    pub classification: Classification,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub plan: SyncPlan,
    pub applied: ApplyOutcome,
}

/// Fetch and classify without touching the store's contents.
pub async fn plan(ctx: &SyncContext) -> SyncResult<SyncPlan> {
    let raw = match ctx.feed.fetch_events().await {
        Ok(raw) => raw,
        Err(e) => {
            error!(error = %e, "failed to fetch calendar");
            return Err(e.into());
        }
    };

    let rows = ctx.store.list_rows(&ctx.events_sheet).await?;
    let persisted = rows.len();

    let events = normalize_all(&ctx.normalizer, raw);
    let index = IdentityIndex::build(rows);
    if !index.duplicates().is_empty() {
        warn!(
            duplicates = ?index.duplicates(),
            "identities appear on more than one row; only the first row is tracked"
        );
    }

    let fetched = events.len();
    let classification = classify(events, &index);

    Ok(SyncPlan {
        fetched,
        persisted,
        classification,
    })
}

/// Run one full reconciliation.
pub async fn run(ctx: &SyncContext) -> SyncResult<RunOutcome> {
    info!(events_sheet = %ctx.events_sheet, "starting sync run");
    let plan = plan(ctx).await?;

    let applier = SyncApplier::new(
        ctx.store.as_ref(),
        &ctx.events_sheet,
        &ctx.log_sheet,
        ctx.normalizer.zone(),
    );
    let applied = applier.apply(&plan.classification).await?;

    info!(
        fetched = plan.fetched,
        created = applied.progress.rows_inserted,
        updated = applied.progress.rows_updated,
        complete = applied.is_complete(),
        "update complete"
    );

    Ok(RunOutcome { plan, applied })
}

/// Skip the container record and records without an identity, normalize the
/// rest, and keep one event per identity (a later record replaces an earlier
/// one in place).
pub fn normalize_all(normalizer: &Normalizer, raw: Vec<RawEvent>) -> Vec<NormalizedEvent> {
    let mut events: Vec<NormalizedEvent> = Vec::with_capacity(raw.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for record in raw {
        if record.is_container() {
            continue;
        }
        if record.uid.is_empty() {
            warn!(summary = ?record.summary, "skipping feed record without an identity");
            continue;
        }

        let event = normalizer.normalize(&record);
        match positions.get(&event.identity) {
            Some(&i) => events[i] = event,
            None => {
                positions.insert(event.identity.clone(), events.len());
                events.push(event);
            }
        }
    }

    events
}
