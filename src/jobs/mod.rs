use crate::metrics;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background maintenance
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
    started_at: Instant,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self {
            context,
            started_at: Instant::now(),
        }
    }

    /// Spawn every periodic task onto the runtime
    pub fn start(self: Arc<Self>) {
        info!("Starting background jobs");

        tokio::spawn(Self::session_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::account_expiry_job(Arc::clone(&self)));
        tokio::spawn(Self::cooldown_prune_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs running");
    }

    /// Cleanup expired dashboard sessions (runs every hour)
    async fn session_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;
            info!("Sweeping expired sessions");

            let start = Instant::now();
            let result = tasks::cleanup_expired_sessions(&scheduler.context).await;
            metrics::record_background_job(
                "session_cleanup",
                if result.is_ok() { "success" } else { "error" },
                start.elapsed().as_secs_f64(),
            );

            match result {
                Ok(count) if count > 0 => info!("Cleaned up {} expired sessions", count),
                Ok(_) => info!("Session cleanup: no expired sessions found"),
                Err(e) => error!("Session sweep failed: {}", e),
            }
        }
    }

    /// Expire overdue stock and refresh the stock gauges (runs every
    /// 5 minutes)
    async fn account_expiry_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            let start = Instant::now();
            let result = tasks::sweep_expired_accounts(&scheduler.context).await;
            metrics::record_background_job(
                "account_expiry",
                if result.is_ok() { "success" } else { "error" },
                start.elapsed().as_secs_f64(),
            );

            match result {
                Ok(count) => {
                    if count > 0 {
                        info!("Expired {} overdue account(s)", count);
                    }
                    if let Err(e) = tasks::refresh_stock_gauges(&scheduler.context).await {
                        error!("Failed to refresh stock gauges: {}", e);
                    }
                }
                Err(e) => error!("Failed to sweep expired accounts: {}", e),
            }
        }
    }

    /// Prune stale cooldown rows (runs every hour)
    async fn cooldown_prune_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;
            info!("Running cooldown prune");

            let start = Instant::now();
            let result = tasks::prune_cooldowns(&scheduler.context).await;
            metrics::record_background_job(
                "cooldown_prune",
                if result.is_ok() { "success" } else { "error" },
                start.elapsed().as_secs_f64(),
            );

            match result {
                Ok(count) if count > 0 => info!("Pruned {} stale cooldown rows", count),
                Ok(_) => {}
                Err(e) => error!("Failed to prune cooldowns: {}", e),
            }
        }
    }

    /// Health check and uptime tick (runs every minute)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            metrics::UPTIME_SECONDS.set(scheduler.started_at.elapsed().as_secs_f64());

            if let Err(e) = tasks::health_check(&scheduler.context).await {
                error!("Health check failed: {}", e);
            }
        }
    }
}
