/// Permission checks and the durable cooldown tracker
///
/// `is_allowed` is a pure function over the requester and the scope's
/// settings. Cooldown state lives in the `claim_cooldowns` table so it
/// survives restarts; one row per (requester, category, guild).
use crate::allocation::Requester;
use crate::bot::settings::BotSettings;
use crate::error::{QmError, QmResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

/// Access level a command or operation requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    User,
    Admin,
}

/// Whether the requester may invoke an operation at `level` right now.
///
/// User level is open to everyone unless the scope restricts it with a
/// non-empty `allowed_role_ids`. Admin level is never open by default:
/// it takes an admin role, the platform's own administrator capability,
/// or (outside any scope) a configured owner identity.
pub fn is_allowed(
    requester: &Requester,
    settings: Option<&BotSettings>,
    level: PermissionLevel,
    owner_ids: &[String],
) -> bool {
    if is_admin(requester, settings, owner_ids) {
        return true;
    }

    match level {
        PermissionLevel::Admin => false,
        PermissionLevel::User => match settings {
            Some(s) if !s.allowed_role_ids.is_empty() => requester
                .role_ids
                .iter()
                .any(|r| s.allowed_role_ids.contains(r)),
            _ => true,
        },
    }
}

/// Admin rule shared by both levels
pub fn is_admin(
    requester: &Requester,
    settings: Option<&BotSettings>,
    owner_ids: &[String],
) -> bool {
    if requester.is_scope_admin {
        return true;
    }
    match settings {
        Some(s) => requester
            .role_ids
            .iter()
            .any(|r| s.admin_role_ids.contains(r)),
        // Direct messages: only configured owners hold admin rights
        None => owner_ids.iter().any(|o| o == &requester.id),
    }
}

/// Reader/writer over the `claim_cooldowns` table
#[derive(Clone)]
pub struct CooldownTracker {
    db: SqlitePool,
}

impl CooldownTracker {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Seconds the requester must still wait before claiming from this
    /// category in this guild. Zero when no prior claim is recorded or
    /// the window has elapsed.
    pub async fn remaining(
        &self,
        requester_id: &str,
        category_id: i64,
        guild_id: &str,
        cooldown_seconds: i64,
    ) -> QmResult<i64> {
        let mut conn = self.db.acquire().await?;
        Self::remaining_on(
            &mut conn,
            requester_id,
            category_id,
            guild_id,
            cooldown_seconds,
            Utc::now(),
        )
        .await
    }

    /// Core cooldown query with an explicit clock, usable inside a
    /// claim transaction.
    pub(crate) async fn remaining_on(
        conn: &mut SqliteConnection,
        requester_id: &str,
        category_id: i64,
        guild_id: &str,
        cooldown_seconds: i64,
        now: DateTime<Utc>,
    ) -> QmResult<i64> {
        let last_claim_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT last_claim_at FROM claim_cooldowns
             WHERE requester_id = ?1 AND category_id = ?2 AND guild_id = ?3",
        )
        .bind(requester_id)
        .bind(category_id)
        .bind(guild_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(QmError::Database)?;

        Ok(match last_claim_at {
            Some(last) => {
                let elapsed = (now - last).num_seconds();
                (cooldown_seconds - elapsed).max(0)
            }
            None => 0,
        })
    }

    /// Record a successful claim. Called inside the claim transaction
    /// so the timestamp becomes durable together with the claim itself.
    pub(crate) async fn record_on(
        conn: &mut SqliteConnection,
        requester_id: &str,
        category_id: i64,
        guild_id: &str,
        now: DateTime<Utc>,
    ) -> QmResult<()> {
        sqlx::query(
            "INSERT INTO claim_cooldowns (requester_id, category_id, guild_id, last_claim_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(requester_id, category_id, guild_id)
             DO UPDATE SET last_claim_at = excluded.last_claim_at",
        )
        .bind(requester_id)
        .bind(category_id)
        .bind(guild_id)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(QmError::Database)?;

        Ok(())
    }

    /// Drop rows older than `cutoff`. Rows past their guild's cooldown
    /// window already read as zero; this only reclaims space.
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> QmResult<u64> {
        let result = sqlx::query("DELETE FROM claim_cooldowns WHERE last_claim_at < ?1")
            .bind(cutoff)
            .execute(&self.db)
            .await
            .map_err(QmError::Database)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with(allowed: Vec<&str>, admin: Vec<&str>) -> BotSettings {
        let now = Utc::now();
        BotSettings {
            id: 1,
            guild_id: "guild-1".to_string(),
            prefix: "!".to_string(),
            allowed_role_ids: allowed.into_iter().map(String::from).collect(),
            admin_role_ids: admin.into_iter().map(String::from).collect(),
            cooldown_seconds: 3600,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_user_level_open_by_default() {
        let settings = settings_with(vec![], vec![]);
        let stranger = Requester::new("u1");
        assert!(is_allowed(
            &stranger,
            Some(&settings),
            PermissionLevel::User,
            &[]
        ));
    }

    #[test]
    fn test_user_level_restricted_by_allowed_roles() {
        let settings = settings_with(vec!["member"], vec![]);

        let stranger = Requester::new("u1");
        assert!(!is_allowed(
            &stranger,
            Some(&settings),
            PermissionLevel::User,
            &[]
        ));

        let member = Requester::new("u2").with_roles(vec!["member".to_string()]);
        assert!(is_allowed(
            &member,
            Some(&settings),
            PermissionLevel::User,
            &[]
        ));
    }

    #[test]
    fn test_admin_level_closed_by_default() {
        let settings = settings_with(vec![], vec![]);

        let stranger = Requester::new("u1");
        assert!(!is_allowed(
            &stranger,
            Some(&settings),
            PermissionLevel::Admin,
            &[]
        ));

        // Platform administrator capability is enough
        let scope_admin = Requester::new("u2").as_scope_admin();
        assert!(is_allowed(
            &scope_admin,
            Some(&settings),
            PermissionLevel::Admin,
            &[]
        ));
    }

    #[test]
    fn test_admin_role_grants_admin_and_user() {
        let settings = settings_with(vec!["member"], vec!["mod"]);
        let moderator = Requester::new("u1").with_roles(vec!["mod".to_string()]);

        assert!(is_allowed(
            &moderator,
            Some(&settings),
            PermissionLevel::Admin,
            &[]
        ));
        // Admins pass user-level gates even without an allowed role
        assert!(is_allowed(
            &moderator,
            Some(&settings),
            PermissionLevel::User,
            &[]
        ));
    }

    #[test]
    fn test_owner_admin_in_direct_messages_only() {
        let owner_ids = vec!["owner-1".to_string()];
        let owner = Requester::new("owner-1");

        assert!(is_allowed(&owner, None, PermissionLevel::Admin, &owner_ids));

        let settings = settings_with(vec![], vec![]);
        assert!(!is_allowed(
            &owner,
            Some(&settings),
            PermissionLevel::Admin,
            &owner_ids
        ));

        let stranger = Requester::new("somebody");
        assert!(!is_allowed(&stranger, None, PermissionLevel::Admin, &owner_ids));
    }

    #[test]
    fn test_dm_user_level_open() {
        let stranger = Requester::new("u1");
        assert!(is_allowed(&stranger, None, PermissionLevel::User, &[]));
    }

    async fn seed_cooldown(pool: &SqlitePool, requester: &str, category: i64, at: DateTime<Utc>) {
        let mut conn = pool.acquire().await.unwrap();
        CooldownTracker::record_on(&mut conn, requester, category, "guild-1", at)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_prior_claim_means_zero() {
        let pool = crate::db::test_pool().await;
        let tracker = CooldownTracker::new(pool);

        let remaining = tracker.remaining("u1", 1, "guild-1", 3600).await.unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_cooldown_monotonic_over_window() {
        let pool = crate::db::test_pool().await;
        let claimed_at = Utc::now();
        seed_cooldown(&pool, "u1", 1, claimed_at).await;

        let mut conn = pool.acquire().await.unwrap();
        let cooldown = 3600;

        let probe = |offset_secs: i64| claimed_at + chrono::Duration::seconds(offset_secs);

        let at_half =
            CooldownTracker::remaining_on(&mut conn, "u1", 1, "guild-1", cooldown, probe(1800))
                .await
                .unwrap();
        let near_end =
            CooldownTracker::remaining_on(&mut conn, "u1", 1, "guild-1", cooldown, probe(3599))
                .await
                .unwrap();
        let at_end =
            CooldownTracker::remaining_on(&mut conn, "u1", 1, "guild-1", cooldown, probe(3600))
                .await
                .unwrap();

        assert_eq!(at_half, 1800);
        assert_eq!(near_end, 1);
        assert!(at_half > near_end);
        assert_eq!(at_end, 0);
    }

    #[tokio::test]
    async fn test_cooldown_keys_are_independent() {
        let pool = crate::db::test_pool().await;
        let now = Utc::now();
        seed_cooldown(&pool, "u1", 1, now).await;

        let tracker = CooldownTracker::new(pool.clone());

        // Same requester, different category
        assert_eq!(tracker.remaining("u1", 2, "guild-1", 3600).await.unwrap(), 0);
        // Different requester, same category
        assert_eq!(tracker.remaining("u2", 1, "guild-1", 3600).await.unwrap(), 0);
        // Same requester and category, different guild
        assert_eq!(
            tracker.remaining("u1", 1, "guild-2", 3600).await.unwrap(),
            0
        );
        // The seeded key itself is hot
        assert!(tracker.remaining("u1", 1, "guild-1", 3600).await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_record_overwrites_previous_claim() {
        let pool = crate::db::test_pool().await;
        let old = Utc::now() - chrono::Duration::hours(2);
        seed_cooldown(&pool, "u1", 1, old).await;
        seed_cooldown(&pool, "u1", 1, Utc::now()).await;

        let tracker = CooldownTracker::new(pool);
        assert!(tracker.remaining("u1", 1, "guild-1", 3600).await.unwrap() > 3590);
    }

    #[tokio::test]
    async fn test_prune_drops_only_old_rows() {
        let pool = crate::db::test_pool().await;
        let now = Utc::now();
        seed_cooldown(&pool, "old", 1, now - chrono::Duration::days(10)).await;
        seed_cooldown(&pool, "fresh", 1, now).await;

        let tracker = CooldownTracker::new(pool);
        let dropped = tracker
            .prune_older_than(now - chrono::Duration::days(7))
            .await
            .unwrap();
        assert_eq!(dropped, 1);

        // Fresh row still there
        assert!(tracker.remaining("fresh", 1, "guild-1", 3600).await.unwrap() > 0);
    }
}
