use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use tenderbridge_core::config::{AppConfig, ConfigError, LedgerMode, LoadOptions};
use tenderbridge_core::{
    AwardJobEngine, AwardJobQueue, AwardJobWorker, AwardLedgerClient, Clock, EventSink,
    InMemoryAwardLedger, LedgerError, SystemClock, TenderLifecycleService, TenderStore,
    TracingEventSink,
};
use tenderbridge_db::{connect_with_settings, migrations, DbPool, SqlAwardJobQueue, SqlTenderStore};
use thiserror::Error;
use tracing::info;

use crate::ledger_http::HttpAwardLedgerClient;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub lifecycle: Arc<TenderLifecycleService>,
    pub worker: Arc<AwardJobWorker>,
    pub ledger: Arc<dyn AwardLedgerClient>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("ledger client setup failed: {0}")]
    Ledger(#[source] LedgerError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        ledger_mode = config.ledger.mode.as_str(),
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ledger = build_ledger(&config, clock.clone())?;
    let store: Arc<dyn TenderStore> = Arc::new(SqlTenderStore::new(db_pool.clone()));
    let queue: Arc<dyn AwardJobQueue> = Arc::new(SqlAwardJobQueue::new(db_pool.clone()));
    let events: Arc<dyn EventSink> = Arc::new(TracingEventSink);
    let engine = AwardJobEngine::new(config.job_engine_config());

    let lifecycle = Arc::new(TenderLifecycleService::new(
        store.clone(),
        queue.clone(),
        events,
        clock.clone(),
        engine.clone(),
        config.lifecycle_settings(),
    ));
    let worker = Arc::new(AwardJobWorker::new(
        store,
        queue,
        ledger.clone(),
        clock,
        engine,
        config.worker_settings(),
    ));

    Ok(Application { config, db_pool, lifecycle, worker, ledger })
}

/// Gateway client in `http` mode, a process-local hash-chained ledger otherwise.
pub fn build_ledger(
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn AwardLedgerClient>, BootstrapError> {
    match config.ledger.mode {
        LedgerMode::Http => {
            let (Some(base_url), Some(api_key)) =
                (config.ledger.base_url.as_ref(), config.ledger.api_key.as_ref())
            else {
                return Err(BootstrapError::Config(ConfigError::Validation(
                    "ledger.base_url and ledger.api_key are required in http mode".to_string(),
                )));
            };
            let client = HttpAwardLedgerClient::new(
                base_url.clone(),
                api_key.clone(),
                Duration::from_secs(config.ledger.request_timeout_secs),
            )
            .map_err(BootstrapError::Ledger)?;
            Ok(Arc::new(client))
        }
        LedgerMode::InMemory => Ok(Arc::new(InMemoryAwardLedger::with_clock(
            config.ledger.signing_key.expose_secret().as_bytes(),
            config.worker.worker_id.clone(),
            clock,
        ))),
    }
}
