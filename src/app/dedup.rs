use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::infra::cache::RedisCache;

const KEY_PREFIX: &str = "modaction:";
const SEEN_SENTINEL: &str = "1";

/// Best-effort duplicate filter. Never authoritative: the storage layer is
/// the only arbiter of novelty, so every error path here reports "unseen".
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Atomic test-and-set; true means the id was unseen and is now marked.
    async fn add(&self, id: &str) -> bool;

    /// Batch membership probe: the subset of `ids` already marked seen.
    async fn contains_multi(&self, ids: &[String]) -> HashSet<String>;

    /// Mark a batch as seen after successful dispatch.
    async fn mark_multi(&self, ids: &[String]);
}

#[derive(Clone)]
pub struct DedupCache {
    cache: RedisCache,
    ttl_seconds: u64,
}

impl DedupCache {
    pub fn new(cache: RedisCache, retention_days: u32) -> Self {
        Self {
            cache,
            ttl_seconds: u64::from(retention_days) * 86_400,
        }
    }

    fn key(id: &str) -> String {
        format!("{}{}", KEY_PREFIX, id)
    }
}

#[async_trait]
impl DedupStore for DedupCache {
    async fn add(&self, id: &str) -> bool {
        match self.cache.add(&Self::key(id), self.ttl_seconds).await {
            Ok(added) => added,
            Err(err) => {
                warn!(error = ?err, id, "dedup cache add failed, treating as unseen");
                true
            }
        }
    }

    async fn contains_multi(&self, ids: &[String]) -> HashSet<String> {
        let keys: Vec<String> = ids.iter().map(|id| Self::key(id)).collect();
        match self.cache.get_multi(&keys).await {
            Ok(present) => present
                .into_iter()
                .filter_map(|key| key.strip_prefix(KEY_PREFIX).map(str::to_string))
                .collect(),
            Err(err) => {
                warn!(error = ?err, "dedup cache probe failed, treating batch as unseen");
                HashSet::new()
            }
        }
    }

    async fn mark_multi(&self, ids: &[String]) {
        let entries: HashMap<String, String> = ids
            .iter()
            .map(|id| (Self::key(id), SEEN_SENTINEL.to_string()))
            .collect();
        if let Err(err) = self.cache.set_multi(&entries, self.ttl_seconds).await {
            warn!(error = ?err, "dedup cache mark failed, ids stay unmarked");
        }
    }
}
