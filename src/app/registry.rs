use anyhow::Result;
use sqlx::Row;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::registry::{SubredditRegistration, WebhookRegistration};
use crate::infra::db::Db;

/// Point-in-time view of the externally owned registration tables.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub subreddits: Vec<SubredditRegistration>,
    pub webhooks: HashMap<String, WebhookRegistration>,
}

pub type SharedRegistry = Arc<RwLock<RegistrySnapshot>>;

/// Read-only loader over the registration tables. Registration writes happen
/// in the external command surface; this side only refreshes snapshots.
#[derive(Clone)]
pub struct RegistryService {
    db: Db,
}

impl RegistryService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn load(&self) -> Result<RegistrySnapshot> {
        let subreddit_rows = sqlx::query(
            "SELECT name, mod_role, channel_id, modlog_account, alert_channel_id \
             FROM subreddit_registrations ORDER BY name",
        )
        .fetch_all(self.db.pool())
        .await?;

        let mut subreddits = Vec::with_capacity(subreddit_rows.len());
        for row in subreddit_rows {
            subreddits.push(SubredditRegistration {
                name: row.get("name"),
                mod_role: row.get("mod_role"),
                channel_id: row.get("channel_id"),
                modlog_account: row.get("modlog_account"),
                alert_channel_id: row.get("alert_channel_id"),
            });
        }

        let webhook_rows = sqlx::query(
            "SELECT subreddit, admin_url, general_url FROM webhook_registrations",
        )
        .fetch_all(self.db.pool())
        .await?;

        let mut webhooks = HashMap::with_capacity(webhook_rows.len());
        for row in webhook_rows {
            let registration = WebhookRegistration {
                subreddit: row.get("subreddit"),
                admin_url: row.get("admin_url"),
                general_url: row.get("general_url"),
            };
            webhooks.insert(registration.subreddit.clone(), registration);
        }

        Ok(RegistrySnapshot {
            subreddits,
            webhooks,
        })
    }

    /// Periodically re-read the registration tables into `shared`. On error
    /// the previous snapshot stays in place.
    pub async fn run_refresh(&self, shared: SharedRegistry, interval_seconds: u64) {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.load().await {
                Ok(snapshot) => {
                    debug!(
                        subreddits = snapshot.subreddits.len(),
                        webhooks = snapshot.webhooks.len(),
                        "registry snapshot refreshed"
                    );
                    *shared.write().await = snapshot;
                }
                Err(err) => {
                    warn!(error = ?err, "registry refresh failed, keeping previous snapshot");
                }
            }
        }
    }
}
