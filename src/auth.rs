/// Authentication extractors for the dashboard API
use crate::{
    accounts::{DashboardUser, ValidatedSession},
    api::middleware::extract_bearer_token,
    context::AppContext,
    error::QmError,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Authenticated dashboard user, resolved from the bearer token
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: DashboardUser,
    pub session_id: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = QmError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| QmError::Authentication("Missing authorization header".to_string()))?;

        let ValidatedSession { session_id, user } =
            state.users.validate_access_token(&token).await?;

        Ok(AuthContext { user, session_id })
    }
}

/// Authenticated administrator; rejects sessions without the admin flag
#[derive(Debug, Clone)]
pub struct AdminAuthContext {
    pub user: DashboardUser,
    pub session_id: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminAuthContext {
    type Rejection = QmError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let AuthContext { user, session_id } =
            AuthContext::from_request_parts(parts, state).await?;

        if !user.is_admin {
            tracing::warn!("User {} attempted an admin endpoint", user.username);
            return Err(QmError::PermissionDenied(
                "Administrator access required".to_string(),
            ));
        }

        Ok(AdminAuthContext { user, session_id })
    }
}
