/// Dashboard user and session management
use crate::accounts::{DashboardUser, Session, ValidatedSession};
use crate::activity::{ActivityLog, LogType};
use crate::config::ServerConfig;
use crate::error::{QmError, QmResult};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

pub struct UserManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
    activity: ActivityLog,
}

impl UserManager {
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>, activity: ActivityLog) -> Self {
        Self {
            db,
            config,
            activity,
        }
    }

    /// Create the configured admin user if no users exist yet.
    /// Called once at startup.
    pub async fn bootstrap_admin(&self) -> QmResult<()> {
        let Some(bootstrap) = &self.config.authentication.bootstrap_admin else {
            return Ok(());
        };

        let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await
            .map_err(QmError::Database)?;

        if user_count > 0 {
            return Ok(());
        }

        self.create_user(&bootstrap.username, &bootstrap.password, true, "system")
            .await?;

        tracing::info!("Bootstrapped admin user: {}", bootstrap.username);

        Ok(())
    }

    /// Create a dashboard user
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        is_admin: bool,
        operator: &str,
    ) -> QmResult<DashboardUser> {
        let username = username.trim();

        // Validate username format
        if username.len() < 3 || username.len() > 32 {
            return Err(QmError::Validation(
                "Username must be 3-32 characters".to_string(),
            ));
        }
        if !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(QmError::Validation(
                "Username may only contain letters, digits, '-', '_' and '.'".to_string(),
            ));
        }
        if password.len() < 8 {
            return Err(QmError::Validation(
                "Password must be at least 8 characters".to_string(),
            ));
        }

        // Check if username is taken
        let existing = sqlx::query("SELECT id FROM users WHERE username = ?1")
            .bind(username)
            .fetch_optional(&self.db)
            .await
            .map_err(QmError::Database)?;

        if existing.is_some() {
            return Err(QmError::Conflict(format!(
                "Username already taken: {}",
                username
            )));
        }

        let password_hash = hash_password(password)?;
        let created_at = Utc::now();

        let result = sqlx::query(
            "INSERT INTO users (username, password_hash, is_admin, created_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(username)
        .bind(&password_hash)
        .bind(is_admin)
        .bind(created_at)
        .execute(&self.db)
        .await
        .map_err(QmError::Database)?;

        let user = DashboardUser {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            password_hash,
            is_admin,
            created_at,
        };

        self.activity
            .append(
                LogType::Info,
                "USER_CREATED",
                &format!(
                    "Dashboard user '{}' created{}",
                    user.username,
                    if is_admin { " (admin)" } else { "" }
                ),
                Some(operator),
            )
            .await?;

        tracing::info!("Created dashboard user: {}", user.username);

        Ok(user)
    }

    /// Verify credentials and open a session
    pub async fn login(&self, username: &str, password: &str) -> QmResult<(DashboardUser, Session)> {
        let user = sqlx::query_as::<_, DashboardUser>(
            "SELECT id, username, password_hash, is_admin, created_at
             FROM users WHERE username = ?1",
        )
        .bind(username.trim())
        .fetch_optional(&self.db)
        .await
        .map_err(QmError::Database)?
        .ok_or_else(|| QmError::Authentication("Invalid credentials".to_string()))?;

        if !verify_password(password, &user.password_hash)? {
            return Err(QmError::Authentication("Invalid credentials".to_string()));
        }

        let session = self.create_session(&user).await?;

        Ok((user, session))
    }

    /// Create a session for a user
    pub async fn create_session(&self, user: &DashboardUser) -> QmResult<Session> {
        let session_id = Uuid::new_v4().to_string();
        let token = self.generate_token(user.id, &session_id)?;

        let now = Utc::now();
        let expires_at = now + chrono::Duration::hours(self.config.authentication.session_ttl_hours);

        sqlx::query(
            "INSERT INTO sessions (id, user_id, token, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&session_id)
        .bind(user.id)
        .bind(&token)
        .bind(now)
        .bind(expires_at)
        .execute(&self.db)
        .await
        .map_err(QmError::Database)?;

        Ok(Session {
            id: session_id,
            user_id: user.id,
            token,
            created_at: now,
            expires_at,
        })
    }

    /// Validate a bearer token and return the session's user
    pub async fn validate_access_token(&self, token: &str) -> QmResult<ValidatedSession> {
        let row = sqlx::query(
            "SELECT s.id AS session_id, s.expires_at,
                    u.id, u.username, u.password_hash, u.is_admin, u.created_at
             FROM sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.token = ?1",
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await
        .map_err(QmError::Database)?
        .ok_or_else(|| QmError::Authentication("Invalid or expired session".to_string()))?;

        let expires_at: DateTime<Utc> = row.get("expires_at");

        // Check expiration
        if Utc::now() > expires_at {
            return Err(QmError::Authentication("Session expired".to_string()));
        }

        Ok(ValidatedSession {
            session_id: row.get("session_id"),
            user: DashboardUser {
                id: row.get("id"),
                username: row.get("username"),
                password_hash: row.get("password_hash"),
                is_admin: row.get("is_admin"),
                created_at: row.get("created_at"),
            },
        })
    }

    /// Drop a session row; the matching JWT stops validating immediately
    pub async fn delete_session(&self, session_id: &str) -> QmResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(session_id)
            .execute(&self.db)
            .await
            .map_err(QmError::Database)?;

        Ok(())
    }

    /// All dashboard users, newest first
    pub async fn list_users(&self) -> QmResult<Vec<DashboardUser>> {
        let users = sqlx::query_as::<_, DashboardUser>(
            "SELECT id, username, password_hash, is_admin, created_at
             FROM users ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.db)
        .await
        .map_err(QmError::Database)?;

        Ok(users)
    }

    /// Remove expired sessions. Called periodically by the scheduler.
    pub async fn cleanup_expired_sessions(&self) -> QmResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?1")
            .bind(Utc::now())
            .execute(&self.db)
            .await
            .map_err(QmError::Database)?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            tracing::info!(deleted, "Cleaned up expired sessions");
        } else {
            tracing::debug!("Session cleanup: nothing expired");
        }

        Ok(deleted)
    }

    /// Signed bearer token tied to one session row
    fn generate_token(&self, user_id: i64, session_id: &str) -> QmResult<String> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        use serde::{Deserialize, Serialize};

        #[derive(Debug, Serialize, Deserialize)]
        struct Claims {
            sub: i64,
            sid: String,
            iat: i64,
            exp: i64,
        }

        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            sid: session_id.to_string(),
            iat: now,
            exp: now + self.config.authentication.session_ttl_hours * 3600,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes()),
        )
        .map_err(|e| QmError::Jwt(format!("Failed to generate token: {}", e)))?;

        Ok(token)
    }
}

fn hash_password(password: &str) -> QmResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| QmError::Internal(format!("Password hashing failed: {}", e)))?;

    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> QmResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| QmError::Internal(format!("Corrupt password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
