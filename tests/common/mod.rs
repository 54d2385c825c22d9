#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use time::OffsetDateTime;
use tokio::sync::watch;

use vigil::app::alerts::AlertSink;
use vigil::app::dedup::DedupStore;
use vigil::app::dispatch::UnitSink;
use vigil::app::store::ActionStore;
use vigil::domain::action::{ModAction, QueryAction};
use vigil::infra::queue::ActionUnit;
use vigil::infra::reddit::{ModlogSource, Page, RawModAction};

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Raw source item as the modlog endpoint would deliver it.
pub fn raw_item(id: &str, fullname: Option<&str>) -> RawModAction {
    let value = json!({
        "id": id,
        "created_utc": 1_700_000_000.0,
        "mod": "some_mod",
        "subreddit": "pics",
        "action": "removecomment",
        "details": "remove",
        "target_fullname": fullname,
        "target_author": "poster",
        "target_body": "the offending body",
        "target_permalink": "/r/pics/comments/abc/",
        "mod_id36": "x9z",
        "sr_id36": "2qh0u"
    });
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

pub fn canonical_action(id: &str, subreddit: &str) -> ModAction {
    ModAction {
        id: id.to_string(),
        created_utc: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        moderator: "some_mod".into(),
        subreddit: subreddit.to_string(),
        mod_action: "removecomment".into(),
        details: Some("remove".into()),
        description: None,
        target_type: None,
        target_id: None,
        target_fullname: None,
        target_author: Some("poster".into()),
        target_body: Some("the offending body".into()),
        target_permalink: Some("/r/pics/comments/abc/".into()),
        target_title: None,
        query_action: None,
    }
}

// ---------------------------------------------------------------------------
// In-memory fakes for the pipeline's trait seams
// ---------------------------------------------------------------------------

/// Dedup store with the same never-authoritative contract as the redis one.
#[derive(Default)]
pub struct MemoryDedup {
    seen: Mutex<HashSet<String>>,
}

impl MemoryDedup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(ids: &[&str]) -> Self {
        Self {
            seen: Mutex::new(ids.iter().map(|id| id.to_string()).collect()),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.lock().unwrap().contains(id)
    }
}

#[async_trait]
impl DedupStore for MemoryDedup {
    async fn add(&self, id: &str) -> bool {
        self.seen.lock().unwrap().insert(id.to_string())
    }

    async fn contains_multi(&self, ids: &[String]) -> HashSet<String> {
        let seen = self.seen.lock().unwrap();
        ids.iter().filter(|id| seen.contains(*id)).cloned().collect()
    }

    async fn mark_multi(&self, ids: &[String]) {
        let mut seen = self.seen.lock().unwrap();
        for id in ids {
            seen.insert(id.clone());
        }
    }
}

/// Records every submitted unit instead of queueing it.
#[derive(Default)]
pub struct RecordingSink {
    units: Mutex<Vec<ActionUnit>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn units(&self) -> Vec<ActionUnit> {
        self.units.lock().unwrap().clone()
    }
}

#[async_trait]
impl UnitSink for RecordingSink {
    async fn submit(&self, unit: ActionUnit) -> Result<()> {
        self.units.lock().unwrap().push(unit);
        Ok(())
    }
}

/// Keyed idempotent audit store: insert-if-absent, report novelty.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, ModAction>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn get(&self, id: &str) -> Option<ModAction> {
        self.rows.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl ActionStore for MemoryStore {
    async fn record(&self, action: &ModAction) -> Result<QueryAction> {
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&action.id) {
            return Ok(QueryAction::Update);
        }
        let mut stored = action.clone();
        stored.query_action = Some(QueryAction::Insert);
        rows.insert(action.id.clone(), stored);
        Ok(QueryAction::Insert)
    }

    async fn recent_ids(&self, _days: u32) -> Result<Vec<String>> {
        Ok(self.rows.lock().unwrap().keys().cloned().collect())
    }
}

/// Records (webhook url, action id) for every delivery attempt.
#[derive(Default)]
pub struct RecordingAlerts {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlerts {
    async fn notify(&self, webhook_url: &str, action: &ModAction) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((webhook_url.to_string(), action.id.clone()));
        Ok(())
    }
}

/// Serves scripted pages; when the live script runs dry it can flip a
/// shutdown channel so stream loops wind down deterministically.
pub struct ScriptedSource {
    history: Mutex<VecDeque<Page>>,
    latest: Mutex<VecDeque<Page>>,
    exhausted_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl ScriptedSource {
    pub fn new(history: Vec<Page>, latest: Vec<Page>) -> Self {
        Self {
            history: Mutex::new(history.into()),
            latest: Mutex::new(latest.into()),
            exhausted_tx: Mutex::new(None),
        }
    }

    /// Signal this sender once the live script is exhausted.
    pub fn shutdown_when_drained(&self, tx: watch::Sender<bool>) {
        *self.exhausted_tx.lock().unwrap() = Some(tx);
    }

    pub fn page(items: Vec<RawModAction>, after: Option<&str>) -> Page {
        Page {
            items,
            after: after.map(str::to_string),
        }
    }
}

#[async_trait]
impl ModlogSource for ScriptedSource {
    async fn history_page(&self, _after: Option<&str>) -> Result<Page> {
        Ok(self.history.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn latest(&self, _before: Option<&str>) -> Result<Page> {
        let page = self.latest.lock().unwrap().pop_front();
        match page {
            Some(page) => Ok(page),
            None => {
                if let Some(tx) = self.exhausted_tx.lock().unwrap().as_ref() {
                    let _ = tx.send(true);
                }
                Ok(Page::default())
            }
        }
    }
}
