use anyhow::Result;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::app::alerts::{self, AlertSink};
use crate::app::dedup::DedupStore;
use crate::app::registry::SharedRegistry;
use crate::app::store::ActionStore;
use crate::domain::action::QueryAction;
use crate::infra::cache::RedisCache;
use crate::infra::queue::{QueueClient, ReceivedUnit};

const IDLE_SLEEP_MS: u64 = 200;
const ERROR_BACKOFF_MS: u64 = 1000;

enum ProcessingOutcome {
    Completed,
    RetryLater,
}

/// One persister executor: drains units from the queue in priority order,
/// performs the idempotent audit writes, and fires alerts for confirmed-new
/// admin actions seen live. Units that fail on storage are left for broker
/// redelivery; units past the delivery bound are dropped.
pub async fn run<St, D, A>(
    queue: QueueClient,
    store: St,
    dedup: D,
    registry: SharedRegistry,
    cache: RedisCache,
    alert_sink: A,
    max_deliveries: u32,
) -> Result<()>
where
    St: ActionStore,
    D: DedupStore,
    A: AlertSink,
{
    info!("persist worker started");
    loop {
        match queue.receive().await {
            Ok(Some(received)) => {
                if received.delivery_count > max_deliveries {
                    error!(
                        unit_id = %received.unit.unit_id,
                        deliveries = received.delivery_count,
                        records = received.unit.actions.len(),
                        "unit exceeded delivery bound, dropping"
                    );
                    if let Err(err) = queue
                        .delete(&received.queue_url, &received.receipt_handle)
                        .await
                    {
                        warn!(error = ?err, "failed to delete poisoned unit");
                    }
                    continue;
                }

                let outcome = match process_unit(
                    &store,
                    &dedup,
                    &registry,
                    &cache,
                    &alert_sink,
                    &received,
                )
                .await
                {
                    Ok(()) => ProcessingOutcome::Completed,
                    Err(err) => {
                        error!(
                            error = ?err,
                            unit_id = %received.unit.unit_id,
                            "failed to persist unit, leaving for redelivery"
                        );
                        ProcessingOutcome::RetryLater
                    }
                };

                if matches!(outcome, ProcessingOutcome::Completed) {
                    if let Err(err) = queue
                        .delete(&received.queue_url, &received.receipt_handle)
                        .await
                    {
                        warn!(error = ?err, "failed to delete queue message");
                    }
                }
            }
            Ok(None) => {
                tokio::time::sleep(Duration::from_millis(IDLE_SLEEP_MS)).await;
            }
            Err(err) => {
                warn!(error = ?err, "queue receive failed, backing off");
                tokio::time::sleep(Duration::from_millis(ERROR_BACKOFF_MS)).await;
            }
        }
    }
}

/// Persist every record in one delivered unit and fire any alerts it earns.
/// Safe under redelivery and reordering: the keyed upsert is the only state
/// transition.
pub async fn process_unit<St, D, A>(
    store: &St,
    dedup: &D,
    registry: &SharedRegistry,
    cache: &RedisCache,
    alert_sink: &A,
    received: &ReceivedUnit,
) -> Result<()>
where
    St: ActionStore,
    D: DedupStore,
    A: AlertSink,
{
    for action in &received.unit.actions {
        let novelty = store.record(action).await?;
        if novelty != QueryAction::Insert {
            continue;
        }

        // Write-through so future readers skip this id without a round trip
        // to storage. Best-effort like every other cache write.
        let _ = dedup.add(&action.id).await;

        if received.unit.admin && received.unit.live {
            let webhook = resolve_webhook(registry, cache, &action.subreddit).await;
            if let Some(url) = webhook {
                if alerts::should_alert(&received.unit, novelty, Some(&url)) {
                    if let Err(err) = alert_sink.notify(&url, action).await {
                        warn!(error = ?err, id = %action.id, "alert delivery failed, dropping");
                    }
                }
            }
        }
    }
    Ok(())
}

/// Registry snapshot first (admin endpoint, then general), then the cache
/// snapshot the supervisor seeded at startup.
async fn resolve_webhook(
    registry: &SharedRegistry,
    cache: &RedisCache,
    subreddit: &str,
) -> Option<String> {
    {
        let snapshot = registry.read().await;
        if let Some(webhook) = snapshot.webhooks.get(subreddit) {
            if let Some(url) = webhook.admin_url.clone().or_else(|| webhook.general_url.clone()) {
                return Some(url);
            }
        }
    }

    for key in [
        alerts::admin_webhook_key(subreddit),
        alerts::general_webhook_key(subreddit),
    ] {
        match cache.get(&key).await {
            Ok(Some(url)) => return Some(url),
            Ok(None) => {}
            Err(err) => {
                warn!(error = ?err, subreddit, "webhook snapshot lookup failed");
            }
        }
    }
    None
}
