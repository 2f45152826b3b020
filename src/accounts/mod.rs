/// Dashboard login identities
///
/// These are the web users who operate the dashboard, distinct from
/// chat requesters, who are identified by the transport and never have
/// rows here.
pub mod manager;

pub use manager::UserManager;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Dashboard user record in the database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DashboardUser {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Session record in the database
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Result of validating a bearer token
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub session_id: String,
    pub user: DashboardUser,
}
