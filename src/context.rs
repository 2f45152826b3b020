/// Application context and dependency injection
use crate::{
    accounts::UserManager,
    activity::ActivityLog,
    allocation::AllocationEngine,
    bot::settings::SettingsManager,
    config::ServerConfig,
    db,
    error::{QmError, QmResult},
    inventory::InventoryManager,
    rate_limit::RateLimiter,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared handles every surface works through: config, pool and
/// the domain services built over them
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub activity: ActivityLog,
    pub inventory: InventoryManager,
    pub engine: AllocationEngine,
    pub users: Arc<UserManager>,
    pub settings: SettingsManager,
    pub rate_limiter: RateLimiter,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Open storage, run migrations and wire up the services
    pub async fn new(config: ServerConfig) -> QmResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let db = db::create_pool(
            &config.storage.inventory_db,
            db::DatabaseOptions::default(),
        )
        .await?;

        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let ctx = Self::assemble(Arc::new(config), db);

        // Seed the configured admin account before anything can log in
        ctx.users.bootstrap_admin().await?;

        Ok(ctx)
    }

    /// Wire up the managers over an open, migrated pool
    fn assemble(config: Arc<ServerConfig>, db: SqlitePool) -> Self {
        let activity = ActivityLog::new(db.clone());
        let inventory = InventoryManager::new(db.clone(), activity.clone());
        let engine = AllocationEngine::new(
            db.clone(),
            Arc::clone(&config),
            activity.clone(),
            inventory.clone(),
        );
        let users = Arc::new(UserManager::new(
            db.clone(),
            Arc::clone(&config),
            activity.clone(),
        ));
        let settings = SettingsManager::new(db.clone(), Arc::clone(&config), activity.clone());
        let rate_limiter = RateLimiter::new(&config.rate_limit);

        Self {
            config,
            db,
            activity,
            inventory,
            engine,
            users,
            settings,
            rate_limiter,
        }
    }

    /// Ensure the data directory exists
    async fn ensure_directories(config: &ServerConfig) -> QmResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                QmError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        Ok(())
    }

    /// Base URL the dashboard is reachable at
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}

/// Context over an in-memory pool for unit tests
#[cfg(test)]
pub async fn test_context() -> AppContext {
    let config = Arc::new(crate::config::tests_support::test_config());
    let db = crate::db::test_pool().await;
    AppContext::assemble(config, db)
}
