use anyhow::Result;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::app::dedup::DedupStore;
use crate::app::dispatch::{BatchDispatcher, UnitSink};
use crate::app::normalize;
use crate::infra::reddit::{ModlogSource, RawModAction};

fn raw_id(raw: &RawModAction) -> Option<String> {
    raw.get("id")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

/// One-shot historical walk for one chunk: paginate newest to oldest until
/// the cursor is exhausted. Each page is membership-filtered as a batch
/// before any heavier work, then dispatched at backlog priority.
pub async fn run_backlog<Src, D, S>(
    source: &Src,
    dedup: &D,
    dispatcher: &BatchDispatcher<'_, S>,
) -> Result<()>
where
    Src: ModlogSource,
    D: DedupStore,
    S: UnitSink,
{
    let mut after: Option<String> = None;
    loop {
        let page = source.history_page(after.as_deref()).await?;
        if page.items.is_empty() {
            break;
        }

        let ids: Vec<String> = page.items.iter().filter_map(raw_id).collect();
        let seen = dedup.contains_multi(&ids).await;

        let mut fresh = Vec::new();
        let mut fresh_ids = Vec::new();
        for raw in &page.items {
            let action = match normalize::normalize(raw) {
                Ok(action) => action,
                Err(err) => {
                    warn!(error = ?err, "skipping malformed modlog item");
                    continue;
                }
            };
            if seen.contains(&action.id) {
                continue;
            }
            fresh_ids.push(action.id.clone());
            fresh.push(action);
        }

        debug!(
            page = ids.len(),
            fresh = fresh.len(),
            "backlog page processed"
        );
        dispatcher.dispatch_page(fresh).await?;
        dedup.mark_multi(&fresh_ids).await;

        after = page.after;
        if after.is_none() {
            break;
        }
    }
    Ok(())
}

/// Continuous long-poll of the live tail. New items flow through single-item
/// dedup filtering into the dispatcher in source order; an interval with no
/// new items becomes an idle tick (the dispatcher's flush trigger). Runs
/// until the shutdown signal, then drains the buffer.
pub async fn run_stream<Src, D, S>(
    source: &Src,
    dedup: &D,
    dispatcher: &mut BatchDispatcher<'_, S>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    Src: ModlogSource,
    D: DedupStore,
    S: UnitSink,
{
    let mut before: Option<String> = None;
    while !*shutdown.borrow() {
        let page = source.latest(before.as_deref()).await?;
        if page.items.is_empty() {
            dispatcher.idle_tick().await?;
        } else {
            if let Some(newest) = page.items.first().and_then(raw_id) {
                before = Some(newest);
            }
            // The source delivers newest first; emit in source order.
            for raw in page.items.iter().rev() {
                let action = match normalize::normalize(raw) {
                    Ok(action) => action,
                    Err(err) => {
                        warn!(error = ?err, "skipping malformed modlog item");
                        continue;
                    }
                };
                if dedup.add(&action.id).await {
                    dispatcher.push(action).await?;
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = shutdown.changed() => {}
        }
    }

    dispatcher.close().await?;
    Ok(())
}
