/// Background task implementations
use crate::{
    activity::LogType, allocation::CooldownTracker, context::AppContext, error::QmResult, metrics,
};
use chrono::{Duration, Utc};

/// Cooldown rows older than this are dropped by the prune job; far
/// longer than any realistic cooldown window.
const COOLDOWN_RETENTION_DAYS: i64 = 7;

/// Delete expired dashboard sessions and refresh the active-session
/// gauge
pub async fn cleanup_expired_sessions(ctx: &AppContext) -> QmResult<u64> {
    let deleted = ctx.users.cleanup_expired_sessions().await?;

    let active: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE expires_at > ?1")
        .bind(Utc::now())
        .fetch_one(&ctx.db)
        .await?;
    metrics::SESSIONS_ACTIVE.set(active);

    Ok(deleted)
}

/// Flip available accounts past their expiry to `expired`.
///
/// Claims already skip overdue rows; the sweep keeps listings and the
/// stock gauges honest in between.
pub async fn sweep_expired_accounts(ctx: &AppContext) -> QmResult<u64> {
    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE accounts
         SET status = 'expired', updated_at = ?1
         WHERE status = 'available' AND expires_at IS NOT NULL AND expires_at <= ?1",
    )
    .bind(now)
    .execute(&ctx.db)
    .await?;

    let expired = result.rows_affected();
    if expired > 0 {
        metrics::record_accounts_expired(expired);
        ctx.activity
            .append(
                LogType::Info,
                "ACCOUNTS_EXPIRED",
                &format!("{} account(s) passed their expiry", expired),
                None,
            )
            .await?;
    }

    Ok(expired)
}

/// Push per-category available counts into the stock gauges
pub async fn refresh_stock_gauges(ctx: &AppContext) -> QmResult<()> {
    for stock in ctx.inventory.list_categories().await? {
        metrics::set_stock_available(&stock.category.name, stock.available);
    }

    Ok(())
}

/// Drop cooldown rows too old to matter to any cooldown window
pub async fn prune_cooldowns(ctx: &AppContext) -> QmResult<u64> {
    let cutoff = Utc::now() - Duration::days(COOLDOWN_RETENTION_DAYS);
    CooldownTracker::new(ctx.db.clone())
        .prune_older_than(cutoff)
        .await
}

/// Verify the database answers
pub async fn health_check(ctx: &AppContext) -> QmResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;

    Ok(())
}
