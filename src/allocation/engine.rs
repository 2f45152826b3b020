/// Allocation engine
///
/// Owns every account state transition: claim, release, restock, bulk
/// add, remove. A claim is one conditional UPDATE that picks the oldest
/// claimable row and flips it in place, so two racing claims can never
/// receive the same account. The cooldown timestamp and the success log
/// entry commit in the same transaction as the claim.
///
/// Every call leaves exactly one activity log entry describing its
/// outcome; storage failures are recorded best-effort before they
/// surface.
use crate::activity::{ActivityLog, LogType};
use crate::allocation::{policy, CooldownTracker, PermissionLevel, Requester};
use crate::bot::settings::BotSettings;
use crate::config::ServerConfig;
use crate::error::{QmError, QmResult};
use crate::inventory::manager::ACCOUNT_COLUMNS;
use crate::inventory::{AccountDraft, AccountStatus, CategoryRef, InventoryManager, ServiceAccount};
use crate::metrics;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AllocationEngine {
    db: SqlitePool,
    config: Arc<ServerConfig>,
    activity: ActivityLog,
    inventory: InventoryManager,
}

impl AllocationEngine {
    pub fn new(
        db: SqlitePool,
        config: Arc<ServerConfig>,
        activity: ActivityLog,
        inventory: InventoryManager,
    ) -> Self {
        Self {
            db,
            config,
            activity,
            inventory,
        }
    }

    /// Claim the oldest available account in a category for `requester`.
    ///
    /// `scope` carries the guild's settings for chat-originated claims;
    /// `None` means a dashboard claim, which skips role and cooldown
    /// policy because the HTTP layer has already authenticated an
    /// admin.
    pub async fn claim(
        &self,
        requester: &Requester,
        category: &CategoryRef,
        scope: Option<&BotSettings>,
    ) -> QmResult<ServiceAccount> {
        let result = self.claim_inner(requester, category, scope).await;

        match &result {
            Ok(account) => {
                metrics::record_claim("success");
                tracing::info!("Claimed account {} for {}", account.email, requester.id);
            }
            Err(e) => self.record_claim_failure(requester, category, e).await,
        }

        result
    }

    async fn claim_inner(
        &self,
        requester: &Requester,
        category_ref: &CategoryRef,
        scope: Option<&BotSettings>,
    ) -> QmResult<ServiceAccount> {
        let category = self
            .inventory
            .get_category(category_ref)
            .await?
            .ok_or_else(|| QmError::CategoryNotFound(category_ref.to_string()))?;

        let owner_ids = &self.config.authentication.owner_ids;

        // Scoped claims pass through role policy; admins are exempt
        // from cooldown entirely
        let cooldown_bound = match scope {
            Some(settings) => {
                if !policy::is_allowed(requester, Some(settings), PermissionLevel::User, owner_ids)
                {
                    return Err(QmError::PermissionDenied(format!(
                        "{} may not claim accounts in this scope",
                        requester.id
                    )));
                }
                !policy::is_admin(requester, Some(settings), owner_ids)
            }
            None => false,
        };

        // Early cooldown check, outside the write transaction, so a
        // cooling-down requester is told so even when stock is empty
        if let Some(settings) = scope {
            if cooldown_bound && settings.cooldown_seconds > 0 {
                let mut conn = self.db.acquire().await?;
                let remaining = CooldownTracker::remaining_on(
                    &mut conn,
                    &requester.id,
                    category.id,
                    &settings.guild_id,
                    settings.cooldown_seconds,
                    Utc::now(),
                )
                .await?;
                if remaining > 0 {
                    return Err(QmError::CooldownActive {
                        remaining_secs: remaining,
                    });
                }
            }
        }

        let mut tx = self.db.begin().await?;
        let now = Utc::now();

        // Oldest claimable row, flipped in one conditional UPDATE
        let claimed: Option<ServiceAccount> = sqlx::query_as(&format!(
            "UPDATE accounts
             SET status = 'generated', generated_by = ?1, generated_at = ?2, updated_at = ?2
             WHERE id = (
                 SELECT id FROM accounts
                 WHERE category_id = ?3 AND status = 'available'
                   AND (expires_at IS NULL OR expires_at > ?2)
                 ORDER BY created_at ASC, id ASC
                 LIMIT 1
             ) AND status = 'available'
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(&requester.id)
        .bind(now)
        .bind(category.id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(account) = claimed else {
            tx.rollback().await?;
            return Err(QmError::StockExhausted(category.name));
        };

        if let Some(settings) = scope {
            if cooldown_bound {
                if settings.cooldown_seconds > 0 {
                    // Re-checked under the write lock: a racing claim by
                    // the same requester may have committed after the
                    // early check passed
                    let remaining = CooldownTracker::remaining_on(
                        &mut tx,
                        &requester.id,
                        category.id,
                        &settings.guild_id,
                        settings.cooldown_seconds,
                        now,
                    )
                    .await?;
                    if remaining > 0 {
                        tx.rollback().await?;
                        return Err(QmError::CooldownActive {
                            remaining_secs: remaining,
                        });
                    }
                }
                CooldownTracker::record_on(
                    &mut tx,
                    &requester.id,
                    category.id,
                    &settings.guild_id,
                    now,
                )
                .await?;
            }
        }

        ActivityLog::append_on(
            &mut tx,
            LogType::Success,
            "ACCOUNT_GENERATED",
            &format!("Generated {} from '{}'", account.email, category.name),
            Some(&requester.id),
        )
        .await?;

        tx.commit().await?;

        Ok(account)
    }

    async fn record_claim_failure(
        &self,
        requester: &Requester,
        category: &CategoryRef,
        error: &QmError,
    ) {
        let (log_type, action, outcome, message) = match error {
            QmError::CategoryNotFound(name) => (
                LogType::Warning,
                "CATEGORY_NOT_FOUND",
                "not_found",
                format!("Claim against unknown category '{}'", name),
            ),
            QmError::PermissionDenied(_) => (
                LogType::Warning,
                "CLAIM_DENIED",
                "denied",
                format!("{} is not allowed to claim from '{}'", requester.id, category),
            ),
            QmError::CooldownActive { remaining_secs } => (
                LogType::Warning,
                "CLAIM_COOLDOWN",
                "cooldown",
                format!(
                    "{} must wait {}s before claiming from '{}' again",
                    requester.id, remaining_secs, category
                ),
            ),
            QmError::StockExhausted(name) => (
                LogType::Warning,
                "STOCK_EXHAUSTED",
                "exhausted",
                format!("No accounts left in '{}'", name),
            ),
            other => (
                LogType::Error,
                "CLAIM_FAILED",
                "error",
                format!("Claim from '{}' by {} failed: {}", category, requester.id, other),
            ),
        };

        metrics::record_claim(outcome);

        // Best-effort: surfacing the original error matters more than
        // the bookkeeping entry
        if let Err(log_err) = self
            .activity
            .append(log_type, action, &message, Some(&requester.id))
            .await
        {
            tracing::warn!("Failed to record claim outcome: {}", log_err);
        }
    }

    /// Return a generated account to stock after its credentials could
    /// not be delivered. Idempotent: releasing an already-available
    /// account reports `false` and logs nothing.
    pub async fn release(&self, account_id: i64) -> QmResult<bool> {
        let account = self
            .inventory
            .get_account(account_id)
            .await?
            .ok_or_else(|| QmError::NotFound(format!("No account with id {}", account_id)))?;

        let result = sqlx::query(
            "UPDATE accounts
             SET status = 'available', generated_by = NULL, generated_at = NULL, updated_at = ?1
             WHERE id = ?2 AND status = 'generated'",
        )
        .bind(Utc::now())
        .bind(account_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        self.activity
            .append(
                LogType::Info,
                "ACCOUNT_RELEASED",
                &format!("Returned {} to stock", account.email),
                account.generated_by.as_deref(),
            )
            .await?;

        tracing::info!("Released account {} back to stock", account.email);

        Ok(true)
    }

    /// Administrative reversal of a claim: force an account back to
    /// available regardless of its current state.
    pub async fn restock(&self, account_id: i64, operator: &str) -> QmResult<ServiceAccount> {
        let result = self.restock_inner(account_id, operator).await;

        if let Err(e) = &result {
            let (log_type, action, message) = match e {
                QmError::NotFound(_) => (
                    LogType::Warning,
                    "ACCOUNT_NOT_FOUND",
                    format!("Restock failed: no account with id {}", account_id),
                ),
                other => (
                    LogType::Error,
                    "RESTOCK_FAILED",
                    format!("Restock of account {} failed: {}", account_id, other),
                ),
            };
            if let Err(log_err) = self
                .activity
                .append(log_type, action, &message, Some(operator))
                .await
            {
                tracing::warn!("Failed to record restock outcome: {}", log_err);
            }
        }

        result
    }

    async fn restock_inner(&self, account_id: i64, operator: &str) -> QmResult<ServiceAccount> {
        let mut tx = self.db.begin().await?;
        let now = Utc::now();

        let account: Option<ServiceAccount> = sqlx::query_as(&format!(
            "UPDATE accounts
             SET status = 'available', generated_by = NULL, generated_at = NULL, updated_at = ?1
             WHERE id = ?2
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(now)
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(account) = account else {
            tx.rollback().await?;
            return Err(QmError::NotFound(format!(
                "No account with id {}",
                account_id
            )));
        };

        ActivityLog::append_on(
            &mut tx,
            LogType::Info,
            "ACCOUNT_RESTOCKED",
            &format!("Restocked {} (#{})", account.email, account.id),
            Some(operator),
        )
        .await?;

        tx.commit().await?;

        tracing::info!("Restocked account {} (#{})", account.email, account.id);

        Ok(account)
    }

    /// Insert a validated batch of drafts into a category. All-or-
    /// nothing: the first invalid draft rejects the whole batch with
    /// its line number, and nothing is persisted.
    pub async fn add_accounts(
        &self,
        category: &CategoryRef,
        drafts: Vec<AccountDraft>,
        expires_at: Option<DateTime<Utc>>,
        operator: &str,
    ) -> QmResult<Vec<ServiceAccount>> {
        let result = self
            .add_accounts_inner(category, drafts, expires_at, operator)
            .await;

        match &result {
            Ok(accounts) => metrics::record_accounts_added(accounts.len() as u64),
            Err(e) => {
                let (log_type, action, message) = match e {
                    QmError::CategoryNotFound(name) => (
                        LogType::Warning,
                        "CATEGORY_NOT_FOUND",
                        format!("Cannot add accounts to unknown category '{}'", name),
                    ),
                    QmError::BatchValidation { line, reason } => (
                        LogType::Warning,
                        "ACCOUNTS_REJECTED",
                        format!(
                            "Batch for '{}' rejected at line {}: {}",
                            category, line, reason
                        ),
                    ),
                    QmError::Validation(reason) => (
                        LogType::Warning,
                        "ACCOUNTS_REJECTED",
                        format!("Batch for '{}' rejected: {}", category, reason),
                    ),
                    other => (
                        LogType::Error,
                        "ADD_FAILED",
                        format!("Adding accounts to '{}' failed: {}", category, other),
                    ),
                };
                if let Err(log_err) = self
                    .activity
                    .append(log_type, action, &message, Some(operator))
                    .await
                {
                    tracing::warn!("Failed to record add outcome: {}", log_err);
                }
            }
        }

        result
    }

    async fn add_accounts_inner(
        &self,
        category_ref: &CategoryRef,
        drafts: Vec<AccountDraft>,
        expires_at: Option<DateTime<Utc>>,
        operator: &str,
    ) -> QmResult<Vec<ServiceAccount>> {
        let category = self
            .inventory
            .get_category(category_ref)
            .await?
            .ok_or_else(|| QmError::CategoryNotFound(category_ref.to_string()))?;

        if drafts.is_empty() {
            return Err(QmError::Validation("No accounts to add".to_string()));
        }

        if let Some(expires_at) = expires_at {
            if expires_at <= Utc::now() {
                return Err(QmError::Validation(
                    "Expiry must be in the future".to_string(),
                ));
            }
        }

        for (idx, draft) in drafts.iter().enumerate() {
            draft.validate(idx + 1)?;
        }

        let mut tx = self.db.begin().await?;
        let now = Utc::now();
        let mut accounts = Vec::with_capacity(drafts.len());

        for draft in &drafts {
            let result = sqlx::query(
                "INSERT INTO accounts (email, password, category_id, status, expires_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'available', ?4, ?5, ?5)",
            )
            .bind(&draft.email)
            .bind(&draft.password)
            .bind(category.id)
            .bind(expires_at)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            accounts.push(ServiceAccount {
                id: result.last_insert_rowid(),
                email: draft.email.clone(),
                password: draft.password.clone(),
                category_id: category.id,
                status: AccountStatus::Available,
                expires_at,
                generated_by: None,
                generated_at: None,
                created_at: now,
                updated_at: now,
            });
        }

        ActivityLog::append_on(
            &mut tx,
            LogType::Success,
            "ACCOUNTS_ADDED",
            &format!("Added {} account(s) to '{}'", accounts.len(), category.name),
            Some(operator),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Added {} accounts to category {}",
            accounts.len(),
            category.name
        );

        Ok(accounts)
    }

    /// Remove the first account matching `email` in a category.
    /// Reports `false` when nothing matched; that is not an error.
    pub async fn remove_account(
        &self,
        category: &CategoryRef,
        email: &str,
        operator: &str,
    ) -> QmResult<bool> {
        let result = self.remove_account_inner(category, email, operator).await;

        match &result {
            // The successful removal is logged inside its transaction
            Ok(true) => {}
            Ok(false) => {
                let message = format!("No account {} in '{}'", email, category);
                if let Err(log_err) = self
                    .activity
                    .append(LogType::Warning, "ACCOUNT_NOT_FOUND", &message, Some(operator))
                    .await
                {
                    tracing::warn!("Failed to record remove outcome: {}", log_err);
                }
            }
            Err(e) => {
                let (log_type, action, message) = match e {
                    QmError::CategoryNotFound(name) => (
                        LogType::Warning,
                        "CATEGORY_NOT_FOUND",
                        format!("Cannot remove account from unknown category '{}'", name),
                    ),
                    other => (
                        LogType::Error,
                        "REMOVE_FAILED",
                        format!("Removing {} from '{}' failed: {}", email, category, other),
                    ),
                };
                if let Err(log_err) = self
                    .activity
                    .append(log_type, action, &message, Some(operator))
                    .await
                {
                    tracing::warn!("Failed to record remove outcome: {}", log_err);
                }
            }
        }

        result
    }

    async fn remove_account_inner(
        &self,
        category_ref: &CategoryRef,
        email: &str,
        operator: &str,
    ) -> QmResult<bool> {
        let category = self
            .inventory
            .get_category(category_ref)
            .await?
            .ok_or_else(|| QmError::CategoryNotFound(category_ref.to_string()))?;

        let mut tx = self.db.begin().await?;

        let removed: Option<(i64,)> = sqlx::query_as(
            "DELETE FROM accounts
             WHERE id = (
                 SELECT id FROM accounts
                 WHERE category_id = ?1 AND email = ?2
                 ORDER BY id ASC
                 LIMIT 1
             )
             RETURNING id",
        )
        .bind(category.id)
        .bind(email)
        .fetch_optional(&mut *tx)
        .await?;

        if removed.is_none() {
            tx.rollback().await?;
            return Ok(false);
        }

        ActivityLog::append_on(
            &mut tx,
            LogType::Info,
            "ACCOUNT_REMOVED",
            &format!("Removed {} from '{}'", email, category.name),
            Some(operator),
        )
        .await?;

        tx.commit().await?;

        tracing::info!("Removed account {} from {}", email, category.name);

        Ok(true)
    }
}
