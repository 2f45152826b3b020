/// Dashboard user administration endpoints
use crate::{accounts::DashboardUser, auth::AdminAuthContext, context::AppContext, error::QmResult};
use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

/// Build user routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/users", get(list_users).post(create_user))
}

#[derive(Debug, Serialize)]
struct ListUsersResponse {
    users: Vec<DashboardUser>,
}

/// List all dashboard users
async fn list_users(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
) -> QmResult<Json<ListUsersResponse>> {
    let users = ctx.users.list_users().await?;
    Ok(Json(ListUsersResponse { users }))
}

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    username: String,
    password: String,
    #[serde(default)]
    is_admin: bool,
}

/// Create a dashboard user
async fn create_user(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Json(req): Json<CreateUserRequest>,
) -> QmResult<Json<DashboardUser>> {
    let user = ctx
        .users
        .create_user(&req.username, &req.password, req.is_admin, &auth.user.username)
        .await?;

    Ok(Json(user))
}
