/// Inventory domain models
///
/// Typed views of the account and category tables, plus the draft type
/// used when importing credential batches.
pub mod manager;

pub use manager::InventoryManager;

use crate::error::{QmError, QmResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle state of a stocked account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AccountStatus {
    Available,
    Generated,
    Expired,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Available => "available",
            AccountStatus::Generated => "generated",
            AccountStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> QmResult<Self> {
        match s {
            "available" => Ok(AccountStatus::Available),
            "generated" => Ok(AccountStatus::Generated),
            "expired" => Ok(AccountStatus::Expired),
            other => Err(QmError::Validation(format!(
                "Unknown account status: {}",
                other
            ))),
        }
    }
}

/// Category record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Stocked account record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub id: i64,
    pub email: String,
    pub password: String,
    pub category_id: i64,
    pub status: AccountStatus,
    pub expires_at: Option<DateTime<Utc>>,
    /// Requester the account was handed to, set only while `generated`
    pub generated_by: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceAccount {
    /// Status with expiry applied at read time. An account past its
    /// `expires_at` is reported expired even if the sweep has not
    /// rewritten the row yet.
    pub fn effective_status(&self, now: DateTime<Utc>) -> AccountStatus {
        match self.expires_at {
            Some(expires_at) if expires_at <= now && self.status == AccountStatus::Available => {
                AccountStatus::Expired
            }
            _ => self.status,
        }
    }
}

/// How callers name a category: by numeric id or by free-form name.
/// Name lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryRef {
    Id(i64),
    Name(String),
}

impl std::fmt::Display for CategoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CategoryRef::Id(id) => write!(f, "#{}", id),
            CategoryRef::Name(name) => write!(f, "{}", name),
        }
    }
}

/// One validated `identifier:secret` pair from a bulk import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDraft {
    pub email: String,
    pub password: String,
}

impl AccountDraft {
    /// Parse a single import line. Returns `Ok(None)` for blank lines.
    ///
    /// Format is `identifier:secret`, split at the first `:`. The
    /// identifier must look like an email (an `@` with non-empty sides)
    /// and the secret must be non-empty. `line` is the 1-based line
    /// number reported on failure.
    pub fn parse_line(line: usize, raw: &str) -> QmResult<Option<Self>> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let Some((email, password)) = trimmed.split_once(':') else {
            return Err(QmError::BatchValidation {
                line,
                reason: "missing ':' separator".to_string(),
            });
        };

        let email = email.trim();
        let password = password.trim();

        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => {
                return Err(QmError::BatchValidation {
                    line,
                    reason: format!("invalid email: {}", email),
                });
            }
        }

        if password.is_empty() {
            return Err(QmError::BatchValidation {
                line,
                reason: "empty password".to_string(),
            });
        }

        Ok(Some(AccountDraft {
            email: email.to_string(),
            password: password.to_string(),
        }))
    }

    /// Parse a whole pasted batch. The first malformed line rejects the
    /// entire batch; blank lines are skipped but still counted.
    pub fn parse_batch(text: &str) -> QmResult<Vec<Self>> {
        let mut drafts = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            if let Some(draft) = Self::parse_line(idx + 1, raw)? {
                drafts.push(draft);
            }
        }
        Ok(drafts)
    }

    /// Re-check a draft that arrived pre-split (e.g. from a JSON body)
    pub fn validate(&self, line: usize) -> QmResult<()> {
        match self.email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => {
                return Err(QmError::BatchValidation {
                    line,
                    reason: format!("invalid email: {}", self.email),
                });
            }
        }
        if self.password.is_empty() {
            return Err(QmError::BatchValidation {
                line,
                reason: "empty password".to_string(),
            });
        }
        Ok(())
    }
}

/// Category row joined with live stock counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryStock {
    #[serde(flatten)]
    pub category: Category,
    pub available: i64,
    pub generated: i64,
    pub total: i64,
}
