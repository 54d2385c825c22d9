use anyhow::Result;
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::app::alerts;
use crate::app::dedup::DedupCache;
use crate::app::dispatch::BatchDispatcher;
use crate::app::maintenance;
use crate::app::reader;
use crate::app::registry::{RegistryService, RegistrySnapshot};
use crate::app::store::PgActionStore;
use crate::config::AppConfig;
use crate::domain::registry::SubredditRegistration;
use crate::domain::stream::StreamKind;
use crate::infra::cache::RedisCache;
use crate::infra::db::Db;
use crate::infra::queue::QueueClient;
use crate::infra::reddit::ModlogClient;

const RESTART_BASE_SECONDS: u64 = 5;
const RESTART_MAX_SECONDS: u64 = 300;
const WEBHOOK_SNAPSHOT_TTL_SECONDS: u64 = 7 * 86_400;

/// One (service-account, community-chunk) slice of the registered set. Each
/// partition gets four isolated workers, one per stream kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub account: String,
    pub subreddits: Vec<String>,
}

/// Group registrations by their assigned service account, then chunk each
/// account's communities so no reader exceeds the source's URL-length and
/// rate-limit constraints.
pub fn partition_registrations(
    registrations: &[SubredditRegistration],
    chunk_size: usize,
) -> Vec<Partition> {
    let mut by_account: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for registration in registrations {
        by_account
            .entry(registration.modlog_account.as_str())
            .or_default()
            .push(registration.name.as_str());
    }

    let mut partitions = Vec::new();
    for (account, names) in by_account {
        for chunk in names.chunks(chunk_size.max(1)) {
            partitions.push(Partition {
                account: account.to_string(),
                subreddits: chunk.iter().map(|name| (*name).to_string()).collect(),
            });
        }
    }
    partitions
}

struct WorkerExit {
    partition: usize,
    kind: StreamKind,
    restarts: u32,
    result: Result<()>,
}

pub struct Supervisor {
    config: AppConfig,
    cache: RedisCache,
    dedup: DedupCache,
    queue: QueueClient,
    registry: RegistryService,
    store: PgActionStore,
}

impl Supervisor {
    pub fn new(config: AppConfig, db: Db, cache: RedisCache, queue: QueueClient) -> Self {
        let dedup = DedupCache::new(cache.clone(), config.cache_retention_days);
        let registry = RegistryService::new(db.clone());
        let store = PgActionStore::new(db);
        Self {
            config,
            cache,
            dedup,
            queue,
            registry,
            store,
        }
    }

    /// Partition the registered set and run one supervised worker per
    /// (chunk, stream kind) until shutdown. Worker death is observed via
    /// task exit; dead continuous workers are respawned with capped backoff.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let snapshot = self.registry.load().await?;
        self.write_webhook_snapshot(&snapshot).await;

        let partitions = partition_registrations(&snapshot.subreddits, self.config.chunk_size);
        info!(
            subreddits = snapshot.subreddits.len(),
            partitions = partitions.len(),
            "starting stream workers"
        );

        let shared = Arc::new(RwLock::new(snapshot));
        let refresh = {
            let registry = self.registry.clone();
            let shared = Arc::clone(&shared);
            let interval = self.config.registry_refresh_seconds;
            tokio::spawn(async move { registry.run_refresh(shared, interval).await })
        };
        let rebuild = tokio::spawn(maintenance::run_rebuild_loop(
            self.cache.clone(),
            self.store.clone(),
            self.dedup.clone(),
            self.config.cache_retention_days,
        ));

        let mut workers: JoinSet<WorkerExit> = JoinSet::new();
        for (index, partition) in partitions.iter().enumerate() {
            if !self
                .config
                .source_account_tokens
                .contains_key(&partition.account)
            {
                warn!(
                    account = %partition.account,
                    subreddits = ?partition.subreddits,
                    "no credentials for service account, skipping partition"
                );
                continue;
            }
            for kind in StreamKind::ALL {
                self.spawn_worker(&mut workers, index, partition, kind, 0, shutdown.clone());
            }
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(exit) => self.handle_exit(&mut workers, &partitions, exit, &shutdown),
                Err(err) => error!(error = ?err, "stream worker panicked"),
            }
        }

        refresh.abort();
        rebuild.abort();
        info!("all stream workers stopped");
        Ok(())
    }

    fn handle_exit(
        &self,
        workers: &mut JoinSet<WorkerExit>,
        partitions: &[Partition],
        exit: WorkerExit,
        shutdown: &watch::Receiver<bool>,
    ) {
        let partition = &partitions[exit.partition];
        match &exit.result {
            Ok(()) => {
                info!(
                    kind = exit.kind.as_str(),
                    account = %partition.account,
                    subreddits = ?partition.subreddits,
                    "stream worker finished"
                );
            }
            Err(err) => {
                error!(
                    error = ?err,
                    kind = exit.kind.as_str(),
                    account = %partition.account,
                    subreddits = ?partition.subreddits,
                    "stream worker died"
                );
                // A dead live tail is a data-loss window the one-shot backlog
                // cannot close, so continuous workers come back with backoff.
                if exit.kind.is_live() && !*shutdown.borrow() {
                    self.spawn_worker(
                        workers,
                        exit.partition,
                        partition,
                        exit.kind,
                        exit.restarts + 1,
                        shutdown.clone(),
                    );
                }
            }
        }
    }

    fn spawn_worker(
        &self,
        workers: &mut JoinSet<WorkerExit>,
        partition_index: usize,
        partition: &Partition,
        kind: StreamKind,
        restarts: u32,
        shutdown: watch::Receiver<bool>,
    ) {
        let config = self.config.clone();
        let dedup = self.dedup.clone();
        let queue = self.queue.clone();
        let token = self
            .config
            .source_account_tokens
            .get(&partition.account)
            .cloned()
            .unwrap_or_default();
        let subreddits = partition.subreddits.clone();

        workers.spawn(async move {
            if restarts > 0 {
                let delay = restart_delay(restarts);
                warn!(
                    kind = kind.as_str(),
                    restarts,
                    delay_seconds = delay.as_secs(),
                    "restarting stream worker after backoff"
                );
                tokio::time::sleep(delay).await;
            }

            let result = run_worker(&config, dedup, queue, token, &subreddits, kind, shutdown).await;
            WorkerExit {
                partition: partition_index,
                kind,
                restarts,
                result,
            }
        });
    }

    /// Seed the cache with the community -> webhook-url mapping before any
    /// worker starts, so cold persister processes can resolve alert targets.
    async fn write_webhook_snapshot(&self, snapshot: &RegistrySnapshot) {
        let mut entries: HashMap<String, String> = HashMap::new();
        for webhook in snapshot.webhooks.values() {
            if let Some(url) = &webhook.admin_url {
                entries.insert(alerts::admin_webhook_key(&webhook.subreddit), url.clone());
            }
            if let Some(url) = &webhook.general_url {
                entries.insert(alerts::general_webhook_key(&webhook.subreddit), url.clone());
            }
        }
        if let Err(err) = self
            .cache
            .set_multi(&entries, WEBHOOK_SNAPSHOT_TTL_SECONDS)
            .await
        {
            warn!(error = ?err, "failed to write webhook snapshot to cache");
        }
    }
}

/// Body of one isolated worker: its own source client (the pagination
/// primitive is stateful and never shared), its own dispatcher.
async fn run_worker(
    config: &AppConfig,
    dedup: DedupCache,
    queue: QueueClient,
    token: String,
    subreddits: &[String],
    kind: StreamKind,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let source = ModlogClient::new(config, token, subreddits, kind.is_admin())?;
    let mut dispatcher = BatchDispatcher::new(
        &queue,
        kind.is_admin(),
        config.buffer_flush_threshold,
        config.dispatch_chunk_size,
    );

    if kind.is_live() {
        reader::run_stream(
            &source,
            &dedup,
            &mut dispatcher,
            Duration::from_secs(config.poll_interval_seconds),
            shutdown,
        )
        .await
    } else {
        reader::run_backlog(&source, &dedup, &dispatcher).await
    }
}

fn restart_delay(restarts: u32) -> Duration {
    let base = RESTART_BASE_SECONDS.saturating_mul(2u64.saturating_pow(restarts.min(6)));
    let capped = base.min(RESTART_MAX_SECONDS);
    let jitter = rand::thread_rng().gen_range(0..=capped / 2);
    Duration::from_secs(capped + jitter)
}
