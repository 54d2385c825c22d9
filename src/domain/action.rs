use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// What a moderation action targeted, derived from the fullname prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetType {
    Comment,
    Account,
    Link,
    Message,
    Subreddit,
    Award,
}

impl TargetType {
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "t1" => Some(TargetType::Comment),
            "t2" => Some(TargetType::Account),
            "t3" => Some(TargetType::Link),
            "t4" => Some(TargetType::Message),
            "t5" => Some(TargetType::Subreddit),
            "t6" => Some(TargetType::Award),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Comment => "Comment",
            TargetType::Account => "Account",
            TargetType::Link => "Link",
            TargetType::Message => "Message",
            TargetType::Subreddit => "Subreddit",
            TargetType::Award => "Award",
        }
    }
}

/// Recorded by the persistence layer: whether the row was newly created or
/// already existed at the time of the write. This is the authoritative
/// novelty signal for the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryAction {
    Insert,
    Update,
}

impl QueryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryAction::Insert => "insert",
            QueryAction::Update => "update",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "insert" => Some(QueryAction::Insert),
            "update" => Some(QueryAction::Update),
            _ => None,
        }
    }
}

/// Canonical record of one moderation event. Append-only once stored;
/// `target_type` and `target_id` are always derived together from
/// `target_fullname` or both absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModAction {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_utc: OffsetDateTime,
    pub moderator: String,
    pub subreddit: String,
    pub mod_action: String,
    pub details: Option<String>,
    pub description: Option<String>,
    pub target_type: Option<TargetType>,
    pub target_id: Option<String>,
    pub target_fullname: Option<String>,
    pub target_author: Option<String>,
    pub target_body: Option<String>,
    pub target_permalink: Option<String>,
    pub target_title: Option<String>,
    pub query_action: Option<QueryAction>,
}
