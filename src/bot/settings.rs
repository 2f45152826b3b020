/// Per-guild bot settings
///
/// A settings row is created lazily the first time a guild is seen,
/// seeded from the configured defaults. Role id lists are stored as
/// JSON arrays in TEXT columns.
use crate::activity::{ActivityLog, LogType};
use crate::config::{validate_prefix, ServerConfig};
use crate::error::{QmError, QmResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;

/// Settings record for one guild
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    pub id: i64,
    pub guild_id: String,
    pub prefix: String,
    /// Role ids allowed to claim; empty means everyone
    pub allowed_role_ids: Vec<String>,
    /// Role ids granted admin commands; empty means scope admins only
    pub admin_role_ids: Vec<String>,
    pub cooldown_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial settings change from the dashboard or an admin command
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub prefix: Option<String>,
    pub cooldown_seconds: Option<i64>,
    pub allowed_role_ids: Option<Vec<String>>,
    pub admin_role_ids: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct SettingsManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
    activity: ActivityLog,
}

impl SettingsManager {
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>, activity: ActivityLog) -> Self {
        Self {
            db,
            config,
            activity,
        }
    }

    /// Fetch settings for a guild, if the guild has been seen
    pub async fn get(&self, guild_id: &str) -> QmResult<Option<BotSettings>> {
        let row = sqlx::query(
            r#"
            SELECT id, guild_id, prefix, allowed_role_ids, admin_role_ids,
                   cooldown_seconds, created_at, updated_at
            FROM bot_settings
            WHERE guild_id = ?
            "#,
        )
        .bind(guild_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(|r| map_settings(&r)).transpose()
    }

    /// Fetch settings for a guild, creating the row with configured
    /// defaults the first time the guild is seen.
    pub async fn get_or_create(&self, guild_id: &str) -> QmResult<BotSettings> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO bot_settings (guild_id, prefix, cooldown_seconds, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(guild_id) DO NOTHING
            "#,
        )
        .bind(guild_id)
        .bind(&self.config.bot.default_prefix)
        .bind(self.config.bot.default_cooldown_seconds)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await?;

        self.get(guild_id).await?.ok_or_else(|| {
            QmError::Internal(format!("Settings row missing for guild {}", guild_id))
        })
    }

    /// Apply a partial update and return the merged settings
    pub async fn update(
        &self,
        guild_id: &str,
        update: SettingsUpdate,
        operator: &str,
    ) -> QmResult<BotSettings> {
        let mut settings = self.get_or_create(guild_id).await?;

        if let Some(prefix) = update.prefix {
            validate_prefix(&prefix)?;
            settings.prefix = prefix;
        }
        if let Some(cooldown) = update.cooldown_seconds {
            if cooldown < 0 {
                return Err(QmError::Validation(
                    "Cooldown cannot be negative".to_string(),
                ));
            }
            settings.cooldown_seconds = cooldown;
        }
        if let Some(allowed) = update.allowed_role_ids {
            settings.allowed_role_ids = allowed;
        }
        if let Some(admin) = update.admin_role_ids {
            settings.admin_role_ids = admin;
        }
        settings.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE bot_settings
            SET prefix = ?, allowed_role_ids = ?, admin_role_ids = ?,
                cooldown_seconds = ?, updated_at = ?
            WHERE guild_id = ?
            "#,
        )
        .bind(&settings.prefix)
        .bind(encode_roles(&settings.allowed_role_ids)?)
        .bind(encode_roles(&settings.admin_role_ids)?)
        .bind(settings.cooldown_seconds)
        .bind(settings.updated_at)
        .bind(guild_id)
        .execute(&self.db)
        .await?;

        self.activity
            .append(
                LogType::Info,
                "SETTINGS_UPDATED",
                &format!(
                    "Settings for guild {} updated (prefix '{}', cooldown {}s)",
                    guild_id, settings.prefix, settings.cooldown_seconds
                ),
                Some(operator),
            )
            .await?;

        tracing::info!("Updated settings for guild {}", guild_id);

        Ok(settings)
    }
}

fn map_settings(row: &SqliteRow) -> QmResult<BotSettings> {
    let allowed_raw: String = row.get("allowed_role_ids");
    let admin_raw: String = row.get("admin_role_ids");

    Ok(BotSettings {
        id: row.get("id"),
        guild_id: row.get("guild_id"),
        prefix: row.get("prefix"),
        allowed_role_ids: decode_roles(&allowed_raw)?,
        admin_role_ids: decode_roles(&admin_raw)?,
        cooldown_seconds: row.get("cooldown_seconds"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn decode_roles(raw: &str) -> QmResult<Vec<String>> {
    serde_json::from_str(raw)
        .map_err(|e| QmError::Internal(format!("Corrupt role list in settings: {}", e)))
}

fn encode_roles(roles: &[String]) -> QmResult<String> {
    serde_json::to_string(roles)
        .map_err(|e| QmError::Internal(format!("Failed to encode role list: {}", e)))
}
