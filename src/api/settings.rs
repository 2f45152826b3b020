/// Per-guild bot settings endpoints
use crate::{
    auth::AdminAuthContext,
    bot::settings::{BotSettings, SettingsUpdate},
    context::AppContext,
    error::QmResult,
};
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

/// Build settings routes
pub fn routes() -> Router<AppContext> {
    Router::new().route(
        "/api/settings/:guild_id",
        get(get_settings).put(update_settings),
    )
}

/// Fetch a guild's settings, creating the row from defaults on first
/// sight
async fn get_settings(
    State(ctx): State<AppContext>,
    _auth: AdminAuthContext,
    Path(guild_id): Path<String>,
) -> QmResult<Json<BotSettings>> {
    let settings = ctx.settings.get_or_create(&guild_id).await?;
    Ok(Json(settings))
}

/// Apply a partial settings update
async fn update_settings(
    State(ctx): State<AppContext>,
    auth: AdminAuthContext,
    Path(guild_id): Path<String>,
    Json(update): Json<SettingsUpdate>,
) -> QmResult<Json<BotSettings>> {
    let settings = ctx
        .settings
        .update(&guild_id, update, &auth.user.username)
        .await?;

    Ok(Json(settings))
}
