use anyhow::{anyhow, Result};
use async_trait::async_trait;
use time::{Duration, OffsetDateTime};

use crate::domain::action::{ModAction, QueryAction};
use crate::infra::db::Db;

/// The audit log write path. The returned `QueryAction` is the system's
/// authoritative novelty signal; nothing upstream of it may claim a record
/// is new.
#[async_trait]
pub trait ActionStore: Send + Sync {
    /// Single idempotent keyed write: insert if absent, leave the stored row
    /// untouched if present, report which happened.
    async fn record(&self, action: &ModAction) -> Result<QueryAction>;

    /// Ids persisted within the last `days` days, for cache rebuilds.
    async fn recent_ids(&self, days: u32) -> Result<Vec<String>>;
}

#[derive(Clone)]
pub struct PgActionStore {
    db: Db,
}

impl PgActionStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ActionStore for PgActionStore {
    async fn record(&self, action: &ModAction) -> Result<QueryAction> {
        // The conflict arm touches only query_action, so no stored field is
        // ever lost on re-delivery, and RETURNING exposes novelty in the same
        // round trip.
        let returned: String = sqlx::query_scalar(
            "INSERT INTO mod_actions \
             (id, created_utc, moderator, subreddit, mod_action, details, description, \
              target_type, target_id, target_fullname, target_author, target_body, \
              target_permalink, target_title, query_action) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 'insert') \
             ON CONFLICT (id) DO UPDATE SET query_action = 'update' \
             RETURNING query_action",
        )
        .bind(&action.id)
        .bind(action.created_utc)
        .bind(&action.moderator)
        .bind(&action.subreddit)
        .bind(&action.mod_action)
        .bind(&action.details)
        .bind(&action.description)
        .bind(action.target_type.map(|t| t.as_str()))
        .bind(&action.target_id)
        .bind(&action.target_fullname)
        .bind(&action.target_author)
        .bind(&action.target_body)
        .bind(&action.target_permalink)
        .bind(&action.target_title)
        .fetch_one(self.db.pool())
        .await?;

        QueryAction::from_str(&returned)
            .ok_or_else(|| anyhow!("unexpected query_action value from storage: {}", returned))
    }

    async fn recent_ids(&self, days: u32) -> Result<Vec<String>> {
        let cutoff = OffsetDateTime::now_utc() - Duration::days(i64::from(days));
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM mod_actions WHERE created_utc >= $1")
                .bind(cutoff)
                .fetch_all(self.db.pool())
                .await?;
        Ok(ids)
    }
}
