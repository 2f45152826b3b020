/// Dashboard authentication endpoints
use crate::{accounts::DashboardUser, auth::AuthContext, context::AppContext, error::QmResult};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
    user: DashboardUser,
}

/// Login endpoint: issues a bearer token for the dashboard
async fn login(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> QmResult<Json<LoginResponse>> {
    let (user, session) = ctx.users.login(&req.username, &req.password).await?;

    Ok(Json(LoginResponse {
        token: session.token,
        user,
    }))
}

/// Logout endpoint: revokes the calling session
async fn logout(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> QmResult<Json<serde_json::Value>> {
    ctx.users.delete_session(&auth.session_id).await?;

    Ok(Json(serde_json::json!({})))
}

/// Current-user endpoint
async fn me(auth: AuthContext) -> Json<DashboardUser> {
    Json(auth.user)
}
