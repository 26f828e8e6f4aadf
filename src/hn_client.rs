use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::{Feed, SourceConfig};
use crate::error::{DuelError, Result};
use crate::models::HackerNewsItem;

/// Upstream listing and detail calls. One network round-trip each; no retry,
/// no caching, no filtering of what comes back.
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// At most `limit` candidate ids, in upstream ranking order.
    async fn list_candidate_ids(&self, limit: usize) -> Result<Vec<u64>>;

    async fn fetch_details(&self, id: u64) -> Result<HackerNewsItem>;
}

pub struct HackerNewsClient {
    client: Client,
    base_url: String,
    feed: Feed,
}

impl HackerNewsClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| DuelError::source_unavailable("http client", e))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            feed: config.feed,
        })
    }

    pub fn feed(&self) -> Feed {
        self.feed
    }

    fn list_url(&self) -> String {
        format!("{}/{}.json", self.base_url, self.feed.endpoint())
    }

    fn item_url(&self, id: u64) -> String {
        format!("{}/item/{}.json", self.base_url, id)
    }
}

#[async_trait]
impl ItemSource for HackerNewsClient {
    async fn list_candidate_ids(&self, limit: usize) -> Result<Vec<u64>> {
        let url = self.list_url();
        let limit_param = limit.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[("orderBy", "\"$priority\""), ("limitToFirst", limit_param.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DuelError::source_unavailable(&url, e))?;

        let mut ids: Vec<u64> = response
            .json()
            .await
            .map_err(|e| DuelError::source_unavailable(&url, e))?;

        // Not every mirror honours limitToFirst
        ids.truncate(limit);
        debug!(feed = ?self.feed, count = ids.len(), "listed candidate ids");
        Ok(ids)
    }

    async fn fetch_details(&self, id: u64) -> Result<HackerNewsItem> {
        let url = self.item_url(id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DuelError::source_unavailable(&url, e))?;

        // The API answers `null` for ids it doesn't know
        let item: Option<HackerNewsItem> = response
            .json()
            .await
            .map_err(|e| DuelError::source_unavailable(&url, e))?;

        item.ok_or_else(|| DuelError::source_unavailable(&url, "item not found"))
    }
}
