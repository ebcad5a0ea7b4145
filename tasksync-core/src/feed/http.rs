use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

use crate::error::FeedError;
use crate::event::RawEvent;
use crate::feed::{FeedSource, parse_feed};

/// An ICS feed served over HTTP(S).
pub struct HttpFeed {
    http: reqwest::Client,
    url: Url,
}

impl HttpFeed {
    /// `webcal://` links are fetched over `https://`.
    pub fn new(feed_url: &str) -> Result<Self, FeedError> {
        let normalized = match feed_url.trim().strip_prefix("webcal://") {
            Some(rest) => format!("https://{rest}"),
            None => feed_url.trim().to_string(),
        };
        let url = Url::parse(&normalized)
            .map_err(|e| FeedError::Parse(format!("Invalid feed URL '{feed_url}': {e}")))?;

        Ok(HttpFeed {
            http: reqwest::Client::new(),
            url,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn fetch_events(&self) -> Result<Vec<RawEvent>, FeedError> {
        info!(host = self.url.host_str().unwrap_or_default(), "fetching calendar");

        let resp = self.http.get(self.url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let body = resp.text().await?;
        let records = parse_feed(&body)?;
        debug!(records = records.len(), "parsed feed");
        Ok(records)
    }
}
