pub mod run;
pub mod status;
pub mod sync;

use anyhow::{Context, Result};
use tasksync_core::SyncContext;
use tasksync_core::feed::HttpFeed;
use tasksync_core::normalize::Normalizer;
use tasksync_core::store::SheetsStore;

use crate::config::AppConfig;

/// Open the feed and the spreadsheet once for the life of the process.
pub async fn connect(config: &AppConfig) -> Result<SyncContext> {
    let feed = HttpFeed::new(&config.feed_url).context("Invalid feed URL")?;
    let zone = config.display_zone()?;

    let store = SheetsStore::connect(&config.sheets_config(), config.token_source()?)
        .await
        .context("Could not open spreadsheet")?;
    let events_sheet = store.events_sheet().clone();
    let log_sheet = store.log_sheet().clone();

    Ok(SyncContext::new(
        Box::new(feed),
        Box::new(store),
        Normalizer::new(zone),
        events_sheet,
        log_sheet,
    ))
}
