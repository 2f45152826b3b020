/// API routes and handlers
pub mod accounts;
pub mod activity;
pub mod auth;
pub mod categories;
pub mod health;
pub mod middleware;
pub mod settings;
pub mod users;

use crate::context::AppContext;
use axum::Router;

/// Every HTTP route the server exposes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(auth::routes())
        .merge(categories::routes())
        .merge(accounts::routes())
        .merge(settings::routes())
        .merge(activity::routes())
        .merge(users::routes())
        .merge(health::routes())
}
