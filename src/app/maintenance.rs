use anyhow::Result;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::app::dedup::DedupStore;
use crate::app::store::ActionStore;
use crate::infra::cache::RedisCache;

/// Claim keys outlive the day they name so a late reader still sees them.
const REBUILD_CLAIM_TTL_SECONDS: u64 = 2 * 86_400;
const REBUILD_TICK_SECONDS: u64 = 3_600;

/// Rebuild the dedup cache from the last `retention_days` of persisted ids,
/// at most once per calendar day across all processes. Cold-start protection
/// against duplicate storms after a cache flush. Returns whether a rebuild
/// actually ran.
pub async fn rebuild_dedup_cache<St, D>(
    cache: &RedisCache,
    store: &St,
    dedup: &D,
    retention_days: u32,
) -> Result<bool>
where
    St: ActionStore,
    D: DedupStore,
{
    let today = OffsetDateTime::now_utc().date();
    let claim_key = format!("modaction:rebuild:{}", today);
    let claimed = match cache.add(&claim_key, REBUILD_CLAIM_TTL_SECONDS).await {
        Ok(claimed) => claimed,
        Err(err) => {
            warn!(error = ?err, "cache rebuild claim failed, skipping");
            return Ok(false);
        }
    };
    if !claimed {
        return Ok(false);
    }

    let ids = store.recent_ids(retention_days).await?;
    dedup.mark_multi(&ids).await;
    info!(ids = ids.len(), retention_days, "dedup cache rebuilt from persisted ids");
    Ok(true)
}

/// Hourly tick; the dated claim key keeps actual rebuilds to once per day.
pub async fn run_rebuild_loop<St, D>(
    cache: RedisCache,
    store: St,
    dedup: D,
    retention_days: u32,
) where
    St: ActionStore,
    D: DedupStore,
{
    let mut ticker = tokio::time::interval(Duration::from_secs(REBUILD_TICK_SECONDS));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(err) = rebuild_dedup_cache(&cache, &store, &dedup, retention_days).await {
            warn!(error = ?err, "dedup cache rebuild failed");
        }
    }
}
