/// Activity feed and dashboard statistics endpoints
use crate::{
    activity::LogEntry,
    auth::{AdminAuthContext, AuthContext},
    context::AppContext,
    error::QmResult,
    inventory::CategoryStock,
};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Build activity routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/activity", get(recent_activity))
        .route("/api/stats", get(get_stats))
}

#[derive(Debug, Deserialize)]
struct ActivityQuery {
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ActivityResponse {
    entries: Vec<LogEntry>,
}

/// Most recent activity log entries, newest first
async fn recent_activity(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
    Query(query): Query<ActivityQuery>,
) -> QmResult<Json<ActivityResponse>> {
    let entries = ctx.activity.recent(query.limit.unwrap_or(50)).await?;
    Ok(Json(ActivityResponse { entries }))
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    total_accounts: i64,
    available_accounts: i64,
    generated_accounts: i64,
    expired_accounts: i64,
    total_users: i64,
    active_sessions: i64,
    activity_entries: i64,
    /// Per-category stock breakdown
    categories: Vec<CategoryStock>,
}

/// Aggregate counts for the dashboard landing page
async fn get_stats(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
) -> QmResult<Json<StatsResponse>> {
    let total_accounts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
        .fetch_one(&ctx.db)
        .await?;

    let available_accounts: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE status = 'available'")
            .fetch_one(&ctx.db)
            .await?;

    let generated_accounts: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE status = 'generated'")
            .fetch_one(&ctx.db)
            .await?;

    let expired_accounts: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE status = 'expired'")
            .fetch_one(&ctx.db)
            .await?;

    let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&ctx.db)
        .await?;

    let active_sessions: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE expires_at > ?1")
            .bind(Utc::now())
            .fetch_one(&ctx.db)
            .await?;

    let activity_entries = ctx.activity.count().await?;

    let categories = ctx.inventory.list_categories().await?;

    Ok(Json(StatsResponse {
        total_accounts,
        available_accounts,
        generated_accounts,
        expired_accounts,
        total_users,
        active_sessions,
        activity_entries,
        categories,
    }))
}
