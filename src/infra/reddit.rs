use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::warn;

use crate::config::AppConfig;

/// One raw modlog item as delivered by the source: a flat key/value object.
pub type RawModAction = Map<String, Value>;

#[derive(Debug, Default)]
pub struct Page {
    pub items: Vec<RawModAction>,
    pub after: Option<String>,
}

/// A reader's view of one (community-chunk, actor-class) slice of the source
/// modlog. One instance per worker: the underlying pagination state is not
/// safe to share across logical consumers.
#[async_trait]
pub trait ModlogSource: Send + Sync {
    /// Next page of the historical walk, newest to oldest.
    async fn history_page(&self, after: Option<&str>) -> Result<Page>;

    /// Items newer than the anchor, newest first. An empty page is an idle
    /// interval, not an error.
    async fn latest(&self, before: Option<&str>) -> Result<Page>;
}

const TRANSIENT_ATTEMPTS: u32 = 3;
const TRANSIENT_PAUSE_MS: u64 = 2000;

pub struct ModlogClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    /// Pre-joined `a+b+c` community path segment.
    subreddits: String,
    admin_only: bool,
    page_limit: usize,
}

impl ModlogClient {
    pub fn new(
        config: &AppConfig,
        token: String,
        subreddits: &[String],
        admin_only: bool,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.source_user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: config.source_base_url.clone(),
            token,
            subreddits: subreddits.join("+"),
            admin_only,
            page_limit: config.page_limit,
        })
    }

    async fn fetch(&self, cursor: &[(&str, &str)]) -> Result<Page> {
        let url = format!("{}/r/{}/about/log", self.base_url, self.subreddits);
        let limit = self.page_limit.to_string();

        for attempt in 1..=TRANSIENT_ATTEMPTS {
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .query(&[("limit", limit.as_str()), ("raw_json", "1")])
                .query(cursor);
            if self.admin_only {
                request = request.query(&[("mod", "a")]);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) if err.is_timeout() || err.is_connect() => {
                    warn!(error = ?err, attempt, "source request failed, retrying");
                    tokio::time::sleep(Duration::from_millis(TRANSIENT_PAUSE_MS)).await;
                    continue;
                }
                Err(err) => return Err(anyhow!(err)),
            };

            let status = response.status();
            if status.as_u16() == 429 {
                warn!(attempt, "source rate limited, retrying");
                tokio::time::sleep(Duration::from_millis(TRANSIENT_PAUSE_MS)).await;
                continue;
            }
            if !status.is_success() {
                // Access revocation, unknown community, or a source-side
                // failure: fatal for this worker, the supervisor decides.
                bail!(
                    "source returned {} for r/{} modlog",
                    status,
                    self.subreddits
                );
            }

            let listing: Listing = response.json().await?;
            return Ok(Page {
                items: listing
                    .data
                    .children
                    .into_iter()
                    .map(|child| child.data)
                    .collect(),
                after: listing.data.after,
            });
        }

        bail!(
            "source unavailable after {} attempts for r/{}",
            TRANSIENT_ATTEMPTS,
            self.subreddits
        )
    }
}

#[async_trait]
impl ModlogSource for ModlogClient {
    async fn history_page(&self, after: Option<&str>) -> Result<Page> {
        match after {
            Some(after) => self.fetch(&[("after", after)]).await,
            None => self.fetch(&[]).await,
        }
    }

    async fn latest(&self, before: Option<&str>) -> Result<Page> {
        match before {
            Some(before) => self.fetch(&[("before", before)]).await,
            None => self.fetch(&[]).await,
        }
    }
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Deserialize)]
struct ListingChild {
    data: RawModAction,
}
