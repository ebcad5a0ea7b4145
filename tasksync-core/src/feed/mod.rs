//! Calendar feed retrieval.

mod http;
mod ics;

pub use http::HttpFeed;
pub use ics::parse_feed;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FeedError;
use crate::event::RawEvent;

/// Something that yields the current set of calendar records.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_events(&self) -> Result<Vec<RawEvent>, FeedError>;
}

#[async_trait]
impl<T: FeedSource + ?Sized> FeedSource for Arc<T> {
    async fn fetch_events(&self) -> Result<Vec<RawEvent>, FeedError> {
        (**self).fetch_events().await
    }
}
