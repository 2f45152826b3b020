/// Router assembly and the listener loop
use crate::{
    api::middleware::track_metrics,
    context::AppContext,
    error::{QmError, QmResult},
    rate_limit::rate_limit_middleware,
};
use axum::{
    http::{header, Method, StatusCode},
    middleware,
    response::Json,
    Router,
};
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Assemble the application router with state already applied
///
/// Integration tests drive the returned router directly through
/// `tower::ServiceExt` without binding a socket.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        // Dashboard API, health probes and /metrics
        .merge(crate::api::routes())
        .with_state(ctx.clone())
        // Request counters and latency histograms
        .layer(middleware::from_fn(track_metrics))
        // Rate limiting sits outside state application so it sees every request
        .layer(middleware::from_fn_with_state(ctx, rate_limit_middleware))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .fallback(not_found)
}

/// Unmatched routes get a JSON body, not axum's empty default
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Bind the configured address and serve until the process exits
pub async fn serve(ctx: AppContext) -> QmResult<()> {
    let addr = format!("{}:{}", ctx.config.service.hostname, ctx.config.service.port);

    info!("Quartermaster listening on {}", addr);
    info!("   Service URL: {}", ctx.service_url());

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| QmError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| QmError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
