use serde::{Deserialize, Serialize};

/// One registered community. Owned and mutated by the external command
/// surface; this pipeline only reads periodic snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubredditRegistration {
    pub name: String,
    pub mod_role: String,
    pub channel_id: String,
    /// Service account whose credentials read this community's modlog.
    pub modlog_account: String,
    pub alert_channel_id: Option<String>,
}

/// Per-community alert endpoints, also externally owned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRegistration {
    pub subreddit: String,
    pub admin_url: Option<String>,
    pub general_url: Option<String>,
}
