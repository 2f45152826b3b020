/// Category management endpoints
use crate::{
    auth::{AdminAuthContext, AuthContext},
    context::AppContext,
    error::QmResult,
    inventory::{Category, CategoryStock},
};
use axum::{
    extract::{Path, State},
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;

/// Build category routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/categories", get(list_categories).post(create_category))
        .route("/api/categories/:id", patch(update_category))
}

/// List all categories with live stock counts
async fn list_categories(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
) -> QmResult<Json<Vec<CategoryStock>>> {
    let categories = ctx.inventory.list_categories().await?;
    Ok(Json(categories))
}

#[derive(Debug, Deserialize)]
struct CreateCategoryRequest {
    name: String,
    description: Option<String>,
}

/// Create a new category (admin only)
async fn create_category(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Json(req): Json<CreateCategoryRequest>,
) -> QmResult<Json<Category>> {
    let category = ctx
        .inventory
        .create_category(&req.name, req.description.as_deref(), &auth.user.username)
        .await?;

    Ok(Json(category))
}

#[derive(Debug, Deserialize)]
struct UpdateCategoryRequest {
    description: Option<String>,
}

/// Update a category's description (admin only)
async fn update_category(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCategoryRequest>,
) -> QmResult<Json<Category>> {
    let category = ctx
        .inventory
        .update_category(id, req.description.as_deref(), &auth.user.username)
        .await?;

    Ok(Json(category))
}
