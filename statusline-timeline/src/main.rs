use std::sync::Arc;

use statusline_core::config::CoreConfig;
use statusline_core::db::DatabasePool;
use statusline_core::errors::{ConfigError, StatusLineError};
use statusline_core::logging;
use statusline_timeline::{
    Backend, MemoryLockProvider, MemoryStatusBoard, MemoryTimelineStore, PgActorDirectory,
    PgLeaseLockProvider, PgStatusPointer, PgTimelineStore, RetentionSweeper, StaticDirectory,
    TimelineApiBuilder, TimelineConfig, TimelineEngine, TimelineStore,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let core = load_core_config()?;
    if let Err(err) = logging::init_tracing(core.log_level.as_deref()) {
        eprintln!("failed to initialise tracing: {err}");
    }

    let config = TimelineConfig::from_env()?;
    info!(
        backend = %config.backend,
        node = %core.node_name,
        environment = ?core.environment,
        "loaded timeline configuration"
    );

    let (engine, store) = build_engine(&core, &config).await?;

    let sweeper = RetentionSweeper::new(store, config.retention(), config.sweep_interval).spawn();
    let server = TimelineApiBuilder::new(engine)
        .serve(&config.bind_address)
        .await
        .map_err(|err| ServerError::Serve(err.to_string()))?;
    info!(addr = %server.addr, "statusline-timeline ready");

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "failed to listen for shutdown signal");
    }
    info!("shutting down statusline-timeline");

    server.shutdown().await;
    sweeper.shutdown().await;
    Ok(())
}

fn load_core_config() -> Result<CoreConfig, StatusLineError> {
    CoreConfig::from_env_with_prefix("TIMELINE_")
        .ok()
        .filter(|config| config.database_url.is_some())
        .map_or_else(CoreConfig::from_env, Ok)
        .map_err(Into::into)
}

async fn build_engine(
    core: &CoreConfig,
    config: &TimelineConfig,
) -> Result<(TimelineEngine, Arc<dyn TimelineStore>), StatusLineError> {
    match config.backend {
        Backend::Memory => {
            if core.is_production() {
                warn!("in-memory backend selected in production; timelines are lost on restart");
            }
            let store: Arc<dyn TimelineStore> = Arc::new(MemoryTimelineStore::new());
            let engine = TimelineEngine::builder(
                store.clone(),
                Arc::new(MemoryLockProvider::new(config.lock_timeout)),
                Arc::new(MemoryStatusBoard::new()),
            )
            .directory(Arc::new(StaticDirectory::new()))
            .annotation_timeout(config.annotation_timeout)
            .build();
            Ok((engine, store))
        }
        Backend::Postgres => {
            let pool = DatabasePool::connect(core).await?;
            let store: Arc<dyn TimelineStore> =
                Arc::new(PgTimelineStore::from_pool(pool.clone()).await?);
            let locks =
                PgLeaseLockProvider::new(pool.clone(), config.lease_ttl, config.lock_timeout);
            let engine = TimelineEngine::builder(
                store.clone(),
                Arc::new(locks),
                Arc::new(PgStatusPointer::new(pool.clone())),
            )
            .directory(Arc::new(PgActorDirectory::new(pool)))
            .annotation_timeout(config.annotation_timeout)
            .build();
            Ok((engine, store))
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("startup error: {0}")]
    Startup(#[from] StatusLineError),
    #[error("http server error: {0}")]
    Serve(String),
}
