/// Stocked-account endpoints
///
/// Listing, bulk import, web claims, restock and removal. All of these
/// are administrative; handlers stay thin and the engine does the
/// logging.
use crate::{
    allocation::Requester,
    auth::AdminAuthContext,
    context::AppContext,
    error::QmResult,
    inventory::{AccountDraft, AccountStatus, CategoryRef, ServiceAccount},
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Build account routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/api/accounts",
            get(list_accounts).post(add_accounts).delete(remove_account),
        )
        .route("/api/accounts/claim", post(claim_account))
        .route("/api/accounts/:id/restock", post(restock_account))
}

#[derive(Debug, Deserialize)]
struct ListAccountsQuery {
    #[serde(default)]
    category_id: Option<i64>,
    #[serde(default)]
    status: Option<AccountStatus>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ListAccountsResponse {
    accounts: Vec<ServiceAccount>,
}

/// List stocked accounts, optionally filtered by category and status
async fn list_accounts(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Query(query): Query<ListAccountsQuery>,
) -> QmResult<Json<ListAccountsResponse>> {
    let accounts = ctx
        .inventory
        .list_accounts(
            query.category_id,
            query.status,
            query.limit.unwrap_or(100),
            query.offset.unwrap_or(0),
        )
        .await?;

    Ok(Json(ListAccountsResponse { accounts }))
}

#[derive(Debug, Deserialize)]
struct AddAccountsRequest {
    category: String,
    /// One `identifier:secret` pair per line, blank lines skipped
    lines: String,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct AddAccountsResponse {
    added: usize,
    accounts: Vec<ServiceAccount>,
}

/// Bulk-import accounts into a category
async fn add_accounts(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Json(req): Json<AddAccountsRequest>,
) -> QmResult<Json<AddAccountsResponse>> {
    let drafts = AccountDraft::parse_batch(&req.lines)?;
    let accounts = ctx
        .engine
        .add_accounts(
            &CategoryRef::Name(req.category),
            drafts,
            req.expires_at,
            &auth.user.username,
        )
        .await?;

    Ok(Json(AddAccountsResponse {
        added: accounts.len(),
        accounts,
    }))
}

#[derive(Debug, Deserialize)]
struct ClaimAccountRequest {
    category: String,
}

/// Claim an account from the dashboard. No scope settings are passed,
/// so the role gate and cooldown do not apply.
async fn claim_account(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Json(req): Json<ClaimAccountRequest>,
) -> QmResult<Json<ServiceAccount>> {
    let requester = Requester::new(auth.user.username.clone());
    let account = ctx
        .engine
        .claim(&requester, &CategoryRef::Name(req.category), None)
        .await?;

    Ok(Json(account))
}

/// Force an account back to available
async fn restock_account(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(id): Path<i64>,
) -> QmResult<Json<ServiceAccount>> {
    let account = ctx.engine.restock(id, &auth.user.username).await?;

    Ok(Json(account))
}

#[derive(Debug, Deserialize)]
struct RemoveAccountRequest {
    category: String,
    email: String,
}

#[derive(Debug, Serialize)]
struct RemoveAccountResponse {
    removed: bool,
}

/// Remove one account by email from a category
async fn remove_account(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Json(req): Json<RemoveAccountRequest>,
) -> QmResult<Json<RemoveAccountResponse>> {
    let removed = ctx
        .engine
        .remove_account(
            &CategoryRef::Name(req.category),
            &req.email,
            &auth.user.username,
        )
        .await?;

    Ok(Json(RemoveAccountResponse { removed }))
}
