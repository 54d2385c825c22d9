use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::domain::action::{ModAction, QueryAction};
use crate::infra::queue::ActionUnit;

/// Cache keys for the community -> webhook-url snapshot the supervisor
/// seeds and cold persister processes fall back to.
pub fn admin_webhook_key(subreddit: &str) -> String {
    format!("webhook:admin:{}", subreddit)
}

pub fn general_webhook_key(subreddit: &str) -> String {
    format!("webhook:general:{}", subreddit)
}

/// The full alert gate: platform-admin subset, confirmed newly inserted,
/// observed on a live stream (never a backlog replay), and an endpoint is
/// actually registered for the community.
pub fn should_alert(unit: &ActionUnit, novelty: QueryAction, webhook_url: Option<&str>) -> bool {
    unit.admin && unit.live && novelty == QueryAction::Insert && webhook_url.is_some()
}

/// Bounded, human-readable notification text.
pub fn render_notification(action: &ModAction, body_max_chars: usize) -> String {
    let mut lines = vec![
        format!(":rotating_light: *Admin action in r/{}*", action.subreddit),
        format!("*Action:* {}", action.mod_action),
        format!("*Moderator:* {}", action.moderator),
    ];

    if let Some(details) = &action.details {
        lines.push(format!("*Details:* {}", details));
    }
    if let Some(author) = &action.target_author {
        lines.push(format!("*Target author:* u/{}", author));
    }
    if let Some(permalink) = &action.target_permalink {
        lines.push(format!("*Target:* https://www.reddit.com{}", permalink));
    } else if let Some(title) = &action.target_title {
        lines.push(format!("*Target:* {}", title));
    }
    if let Some(body) = &action.target_body {
        lines.push(format!("> {}", truncate_body(body, body_max_chars)));
    }

    lines.join("\n")
}

fn truncate_body(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let head: String = body.chars().take(max_chars).collect();
    format!("{}… (more available)", head)
}

/// Outbound alert delivery. Explicitly lossy: one attempt, failures are the
/// caller's to log and drop, ingestion never waits on it.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, webhook_url: &str, action: &ModAction) -> Result<()>;
}

pub struct WebhookNotifier {
    http: reqwest::Client,
    body_max_chars: usize,
}

impl WebhookNotifier {
    pub fn new(body_max_chars: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            body_max_chars,
        }
    }
}

#[async_trait]
impl AlertSink for WebhookNotifier {
    async fn notify(&self, webhook_url: &str, action: &ModAction) -> Result<()> {
        let payload = json!({
            "text": render_notification(action, self.body_max_chars),
            "unfurl_links": false,
        });

        let resp = self.http.post(webhook_url).json(&payload).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "alert webhook returned non-success");
            bail!("alert webhook returned {status}");
        }

        Ok(())
    }
}
