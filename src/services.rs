//! Service registry
//!
//! All shared singletons (session cache, solver queue, stores, dispatcher,
//! background loops) are constructed here once and threaded through the
//! call graph. Nothing in the workspace reaches for process globals;
//! tests build their own registry.

use crate::config::AppConfig;
use chrono::Utc;
use magnetarr_core::{HealthStore, Result, SessionStore, TitleResolver};
use magnetarr_fetch::{ProtectedFetcher, SessionCache, SolverClient, SolverConfig};
use magnetarr_indexers::{
    load_cached_definitions, DefinitionStore, DefinitionSync, DispatcherConfig, HealthProbe,
    ProbeConfig, SearchDispatcher, SyncConfig,
};
use magnetarr_infrastructure::{
    apply_schema, create_pool, CinemetaClient, DatabaseConfig, DatabasePool,
    PostgresHealthStore, PostgresSessionStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How often expired bypass sessions get purged.
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Clone)]
pub struct AppServices {
    pub pool: DatabasePool,
    pub health_store: Arc<dyn HealthStore>,
    pub definitions: Arc<DefinitionStore>,
    pub fetcher: Arc<ProtectedFetcher>,
    pub dispatcher: Arc<SearchDispatcher>,
    pub probe: Arc<HealthProbe>,
    pub sync: Arc<DefinitionSync>,
}

impl AppServices {
    pub async fn build(config: &AppConfig) -> Result<Self> {
        let pool = create_pool(DatabaseConfig::from_env())?;
        if let Err(e) = apply_schema(&pool).await {
            // A store outage at startup is survivable: searches fall back
            // to the built-in drivers until the database comes back.
            warn!(error = %e, "schema apply failed, continuing degraded");
        }

        let health_store: Arc<dyn HealthStore> =
            Arc::new(PostgresHealthStore::new(pool.clone()));
        let session_store: Arc<dyn SessionStore> =
            Arc::new(PostgresSessionStore::new(pool.clone()));

        let solver = config.solver_url.as_ref().map(|url| {
            info!(solver = %url, "challenge solver configured");
            SolverClient::spawn(SolverConfig::new(url))
        });
        let fetcher = Arc::new(ProtectedFetcher::new(
            SessionCache::new(Some(session_store)),
            solver,
        )?);

        let definitions = Arc::new(DefinitionStore::new());
        match load_cached_definitions(&config.definitions_cache_dir, &definitions).await {
            Ok(0) => info!("no cached definitions, waiting for first sync"),
            Ok(count) => info!(count, "definitions loaded from local cache"),
            Err(e) => warn!(error = %e, "definition cache unreadable"),
        }

        let resolver: Arc<dyn TitleResolver> = Arc::new(CinemetaClient::new()?);
        let dispatcher = Arc::new(SearchDispatcher::with_default_drivers(
            health_store.clone(),
            definitions.clone(),
            fetcher.clone(),
            Some(resolver),
            DispatcherConfig {
                include_slow_tier: config.include_slow_tier,
                ..DispatcherConfig::default()
            },
        ));

        let probe = Arc::new(HealthProbe::new(
            health_store.clone(),
            definitions.clone(),
            fetcher.clone(),
            ProbeConfig {
                budget: config.probe_budget(),
                ..ProbeConfig::default()
            },
        ));
        let sync = Arc::new(DefinitionSync::new(
            SyncConfig::new(&config.definitions_base_url, &config.definitions_cache_dir),
            definitions.clone(),
            health_store.clone(),
        )?);

        Ok(Self {
            pool,
            health_store,
            definitions,
            fetcher,
            dispatcher,
            probe,
            sync,
        })
    }

    /// Spawn the background schedules: definition sync, health probing,
    /// session purging. Each loop runs until the process exits.
    pub fn spawn_background(&self, config: &AppConfig) {
        let sync = self.sync.clone();
        let sync_interval = config.sync_interval();
        tokio::spawn(async move {
            // First sync immediately so a cold start gets definitions.
            loop {
                sync.run_once().await;
                tokio::time::sleep(sync_interval).await;
            }
        });

        let probe = self.probe.clone();
        let probe_interval = config.probe_interval();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(probe_interval).await;
                probe.run_once().await;
            }
        });

        let fetcher = self.fetcher.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(SESSION_PURGE_INTERVAL).await;
                fetcher.sessions().purge_expired(Utc::now()).await;
            }
        });
    }
}
