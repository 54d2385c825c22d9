use anyhow::anyhow;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil::app::alerts::WebhookNotifier;
use vigil::app::dedup::DedupCache;
use vigil::app::registry::RegistryService;
use vigil::app::store::PgActionStore;
use vigil::app::supervisor::Supervisor;
use vigil::config::AppConfig;
use vigil::infra::{cache::RedisCache, db::Db, queue::QueueClient};
use vigil::jobs::persist_worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = Db::connect(&config).await?;
    let cache = RedisCache::connect(&config.redis_url).await?;
    let queue = QueueClient::new(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let app_mode = config.app_mode.clone();
    match app_mode.as_str() {
        "ingest" => {
            tracing::info!("starting ingest mode");
            let supervisor = Supervisor::new(config, db, cache, queue);
            supervisor.run(shutdown_rx).await?;
        }
        "worker" => {
            tracing::info!(concurrency = config.worker_concurrency, "starting worker mode");
            let registry = RegistryService::new(db.clone());
            let shared = Arc::new(RwLock::new(registry.load().await?));
            let refresh = {
                let registry = registry.clone();
                let shared = Arc::clone(&shared);
                let interval = config.registry_refresh_seconds;
                tokio::spawn(async move { registry.run_refresh(shared, interval).await })
            };

            let store = PgActionStore::new(db.clone());
            let dedup = DedupCache::new(cache.clone(), config.cache_retention_days);

            let mut executors = Vec::with_capacity(config.worker_concurrency);
            for _ in 0..config.worker_concurrency {
                executors.push(tokio::spawn(persist_worker::run(
                    queue.clone(),
                    store.clone(),
                    dedup.clone(),
                    Arc::clone(&shared),
                    cache.clone(),
                    WebhookNotifier::new(config.alert_body_max_chars),
                    config.queue_max_deliveries,
                )));
            }

            let mut shutdown = shutdown_rx.clone();
            tokio::select! {
                joined = futures::future::select_all(executors) => {
                    let (result, _, _) = joined;
                    result??;
                }
                _ = shutdown.changed() => {
                    tracing::info!("shutdown signal received, stopping executors");
                }
            }
            refresh.abort();
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
