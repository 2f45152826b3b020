/// Health probes and the metrics endpoint
///
/// `/health/live` answers whenever the process does; `/health/ready`
/// checks the database and inventory before admitting traffic;
/// `/health/detailed` reports per-component results. The Prometheus
/// registry is rendered at `/metrics`.
use crate::{context::AppContext, error::QmResult, jobs, metrics};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::Serialize;
use std::time::Instant;

/// Aggregate report returned by the detailed endpoint
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// "healthy", "degraded" or "unhealthy"
    pub status: String,
    pub version: String,
    pub uptime_seconds: f64,
    pub checks: Vec<ComponentHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One subsystem's line in the report
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Free-form extras, e.g. pool size or stock totals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/live", get(liveness_probe))
        .route("/health/ready", get(readiness_probe))
        .route("/health/detailed", get(health_detailed))
        .route("/metrics", get(serve_metrics))
}

pub async fn health_basic() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Always succeeds while the process can respond at all
pub async fn liveness_probe() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// 200 when the service can take traffic, 503 otherwise
pub async fn readiness_probe(
    State(ctx): State<AppContext>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if let Err(e) = ping_database(&ctx).await {
        tracing::warn!(error = %e, "readiness_probe_failed: database check failed");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    if let Err(e) = ctx.inventory.list_categories().await {
        tracing::warn!(error = %e, "readiness_probe_failed: inventory check failed");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(serde_json::json!({
        "status": "ready",
        "version": env!("CARGO_PKG_VERSION")
    })))
}

pub async fn health_detailed(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthStatus>) {
    let start = Instant::now();

    let checks = vec![
        check_database(&ctx).await,
        check_inventory(&ctx).await,
        check_background_jobs(&ctx).await,
    ];

    let status = overall_status(&checks);

    let health = HealthStatus {
        status: status.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: metrics::UPTIME_SECONDS.get(),
        checks,
        message: if status == "healthy" {
            None
        } else {
            Some("One or more components failed their checks".to_string())
        },
    };

    let status_code = match status.as_str() {
        // Degraded still serves traffic
        "healthy" | "degraded" => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };

    tracing::info!(
        status = %status,
        duration_ms = start.elapsed().as_millis(),
        "health_check_completed"
    );

    (status_code, Json(health))
}

/// Render the Prometheus registry
pub async fn serve_metrics() -> String {
    metrics::render_metrics()
}

async fn ping_database(ctx: &AppContext) -> QmResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;
    Ok(())
}

async fn check_database(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();

    match ping_database(ctx).await {
        Ok(_) => ComponentHealth {
            name: "database".to_string(),
            status: "healthy".to_string(),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
            details: Some(serde_json::json!({
                "type": "sqlite",
                "pool_size": ctx.db.size(),
            })),
        },
        Err(e) => ComponentHealth {
            name: "database".to_string(),
            status: "unhealthy".to_string(),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            error: Some(e.to_string()),
            details: None,
        },
    }
}

async fn check_inventory(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();

    match ctx.inventory.list_categories().await {
        Ok(categories) => {
            let available: i64 = categories.iter().map(|c| c.available).sum();
            ComponentHealth {
                name: "inventory".to_string(),
                status: "healthy".to_string(),
                response_time_ms: Some(start.elapsed().as_millis() as u64),
                error: None,
                details: Some(serde_json::json!({
                    "categories": categories.len(),
                    "available": available,
                })),
            }
        }
        Err(e) => ComponentHealth {
            name: "inventory".to_string(),
            status: "unhealthy".to_string(),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            error: Some(e.to_string()),
            details: None,
        },
    }
}

async fn check_background_jobs(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();

    match jobs::tasks::health_check(ctx).await {
        Ok(_) => ComponentHealth {
            name: "background_jobs".to_string(),
            status: "healthy".to_string(),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
            details: Some(serde_json::json!({
                "scheduler": "running",
            })),
        },
        // Jobs failing is degraded, not critical
        Err(e) => ComponentHealth {
            name: "background_jobs".to_string(),
            status: "degraded".to_string(),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            error: Some(e.to_string()),
            details: None,
        },
    }
}

/// Worst component wins: any unhealthy check sinks the whole report
fn overall_status(checks: &[ComponentHealth]) -> String {
    if checks.iter().any(|c| c.status == "unhealthy") {
        "unhealthy".to_string()
    } else if checks.iter().any(|c| c.status == "degraded") {
        "degraded".to_string()
    } else {
        "healthy".to_string()
    }
}
