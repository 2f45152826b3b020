/// Category and account queries
///
/// Owns category CRUD and read access to stocked accounts. Account
/// state transitions (claim, release, restock) live in the allocation
/// engine; this manager never flips an account's status.
use crate::activity::{ActivityLog, LogType};
use crate::error::{QmError, QmResult};
use crate::inventory::{AccountStatus, Category, CategoryRef, CategoryStock, ServiceAccount};
use chrono::Utc;
use sqlx::{Row, SqlitePool};

pub(crate) const ACCOUNT_COLUMNS: &str =
    "id, email, password, category_id, status, expires_at, generated_by, generated_at, created_at, updated_at";

#[derive(Clone)]
pub struct InventoryManager {
    db: SqlitePool,
    activity: ActivityLog,
}

impl InventoryManager {
    pub fn new(db: SqlitePool, activity: ActivityLog) -> Self {
        Self { db, activity }
    }

    /// Create a category. Names are unique case-insensitively.
    pub async fn create_category(
        &self,
        name: &str,
        description: Option<&str>,
        operator: &str,
    ) -> QmResult<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(QmError::Validation(
                "Category name cannot be empty".to_string(),
            ));
        }
        if name.len() > 64 {
            return Err(QmError::Validation(
                "Category name cannot exceed 64 characters".to_string(),
            ));
        }

        // Check for an existing category first so the caller gets a
        // Conflict instead of a bare constraint violation
        let existing = sqlx::query("SELECT id FROM account_categories WHERE name = ?1 COLLATE NOCASE")
            .bind(name)
            .fetch_optional(&self.db)
            .await
            .map_err(QmError::Database)?;

        if existing.is_some() {
            return Err(QmError::Conflict(format!(
                "Category already exists: {}",
                name
            )));
        }

        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO account_categories (name, description, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(name)
        .bind(description)
        .bind(created_at)
        .execute(&self.db)
        .await
        .map_err(QmError::Database)?;

        let category = Category {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            description: description.map(|s| s.to_string()),
            created_at,
        };

        self.activity
            .append(
                LogType::Info,
                "CATEGORY_CREATED",
                &format!("Category '{}' created", category.name),
                Some(operator),
            )
            .await?;

        tracing::info!("Created category: {} (#{})", category.name, category.id);

        Ok(category)
    }

    /// Update a category's description
    pub async fn update_category(
        &self,
        id: i64,
        description: Option<&str>,
        operator: &str,
    ) -> QmResult<Category> {
        let result = sqlx::query("UPDATE account_categories SET description = ?1 WHERE id = ?2")
            .bind(description)
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(QmError::Database)?;

        if result.rows_affected() == 0 {
            return Err(QmError::NotFound(format!("No category with id {}", id)));
        }

        let category = self
            .get_category(&CategoryRef::Id(id))
            .await?
            .ok_or_else(|| QmError::NotFound(format!("No category with id {}", id)))?;

        self.activity
            .append(
                LogType::Info,
                "CATEGORY_UPDATED",
                &format!("Category '{}' updated", category.name),
                Some(operator),
            )
            .await?;

        Ok(category)
    }

    /// Look up a category by id or by case-insensitive name
    pub async fn get_category(&self, category: &CategoryRef) -> QmResult<Option<Category>> {
        let query = match category {
            CategoryRef::Id(id) => sqlx::query_as::<_, Category>(
                "SELECT id, name, description, created_at FROM account_categories WHERE id = ?1",
            )
            .bind(*id),
            CategoryRef::Name(name) => sqlx::query_as::<_, Category>(
                "SELECT id, name, description, created_at FROM account_categories
                 WHERE name = ?1 COLLATE NOCASE",
            )
            .bind(name.clone()),
        };

        let category = query
            .fetch_optional(&self.db)
            .await
            .map_err(QmError::Database)?;

        Ok(category)
    }

    /// All categories with live stock counts, ordered by name.
    ///
    /// `available` excludes accounts whose `expires_at` has passed even
    /// if the expiry sweep has not rewritten them yet.
    pub async fn list_categories(&self) -> QmResult<Vec<CategoryStock>> {
        let now = Utc::now();

        let rows = sqlx::query(
            "SELECT c.id, c.name, c.description, c.created_at,
                    COUNT(a.id) AS total,
                    COALESCE(SUM(CASE WHEN a.status = 'available'
                                       AND (a.expires_at IS NULL OR a.expires_at > ?1)
                                      THEN 1 ELSE 0 END), 0) AS available,
                    COALESCE(SUM(CASE WHEN a.status = 'generated' THEN 1 ELSE 0 END), 0) AS generated
             FROM account_categories c
             LEFT JOIN accounts a ON a.category_id = c.id
             GROUP BY c.id
             ORDER BY c.name COLLATE NOCASE",
        )
        .bind(now)
        .fetch_all(&self.db)
        .await
        .map_err(QmError::Database)?;

        let mut categories = Vec::with_capacity(rows.len());
        for row in rows {
            categories.push(CategoryStock {
                category: Category {
                    id: row.get("id"),
                    name: row.get("name"),
                    description: row.get("description"),
                    created_at: row.get("created_at"),
                },
                available: row.get("available"),
                generated: row.get("generated"),
                total: row.get("total"),
            });
        }

        Ok(categories)
    }

    /// Number of claimable accounts in a category right now
    pub async fn count_available(&self, category_id: i64) -> QmResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM accounts
             WHERE category_id = ?1 AND status = 'available'
               AND (expires_at IS NULL OR expires_at > ?2)",
        )
        .bind(category_id)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await
        .map_err(QmError::Database)?;

        Ok(count)
    }

    /// Paged account listing for the dashboard, with optional filters
    pub async fn list_accounts(
        &self,
        category_id: Option<i64>,
        status: Option<AccountStatus>,
        limit: i64,
        offset: i64,
    ) -> QmResult<Vec<ServiceAccount>> {
        let limit = limit.clamp(1, 500);
        let offset = offset.max(0);

        let accounts = sqlx::query_as::<_, ServiceAccount>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts
             WHERE (?1 IS NULL OR category_id = ?1)
               AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, id DESC
             LIMIT ?3 OFFSET ?4"
        ))
        .bind(category_id)
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .map_err(QmError::Database)?;

        Ok(accounts)
    }

    /// Fetch one account by id
    pub async fn get_account(&self, id: i64) -> QmResult<Option<ServiceAccount>> {
        let account = sqlx::query_as::<_, ServiceAccount>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(QmError::Database)?;

        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_manager() -> InventoryManager {
        let pool = crate::db::test_pool().await;
        let activity = ActivityLog::new(pool.clone());
        InventoryManager::new(pool, activity)
    }

    async fn seed_account(
        manager: &InventoryManager,
        category_id: i64,
        email: &str,
        status: &str,
    ) -> i64 {
        let now = Utc::now();
        let (generated_by, generated_at) = if status == "generated" {
            (Some("someone"), Some(now))
        } else {
            (None, None)
        };
        sqlx::query(
            "INSERT INTO accounts (email, password, category_id, status, generated_by, generated_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        )
        .bind(email)
        .bind("pw")
        .bind(category_id)
        .bind(status)
        .bind(generated_by)
        .bind(generated_at)
        .bind(now)
        .execute(&manager.db)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_create_category() {
        let manager = create_test_manager().await;

        let category = manager
            .create_category("Netflix", Some("streaming"), "admin")
            .await
            .unwrap();
        assert_eq!(category.name, "Netflix");
        assert_eq!(category.description.as_deref(), Some("streaming"));

        // Creation leaves an audit entry
        let entries = manager.activity.recent(10).await.unwrap();
        assert_eq!(entries[0].action, "CATEGORY_CREATED");
    }

    #[tokio::test]
    async fn test_duplicate_category_rejected_case_insensitively() {
        let manager = create_test_manager().await;
        manager
            .create_category("Netflix", None, "admin")
            .await
            .unwrap();

        let result = manager.create_category("netflix", None, "admin").await;
        match result.unwrap_err() {
            QmError::Conflict(_) => {}
            other => panic!("Expected Conflict error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_category_name_rejected() {
        let manager = create_test_manager().await;
        let result = manager.create_category("   ", None, "admin").await;
        match result.unwrap_err() {
            QmError::Validation(_) => {}
            other => panic!("Expected Validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_category_by_name_ignores_case() {
        let manager = create_test_manager().await;
        let created = manager
            .create_category("Spotify", None, "admin")
            .await
            .unwrap();

        let found = manager
            .get_category(&CategoryRef::Name("SPOTIFY".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);

        let by_id = manager
            .get_category(&CategoryRef::Id(created.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_id.name, "Spotify");
    }

    #[tokio::test]
    async fn test_list_categories_counts() {
        let manager = create_test_manager().await;
        let cat = manager
            .create_category("netflix", None, "admin")
            .await
            .unwrap();
        manager
            .create_category("spotify", None, "admin")
            .await
            .unwrap();

        seed_account(&manager, cat.id, "a@b.c", "available").await;
        seed_account(&manager, cat.id, "d@e.f", "available").await;
        seed_account(&manager, cat.id, "g@h.i", "generated").await;

        let listed = manager.list_categories().await.unwrap();
        assert_eq!(listed.len(), 2);

        let netflix = listed.iter().find(|c| c.category.name == "netflix").unwrap();
        assert_eq!(netflix.available, 2);
        assert_eq!(netflix.generated, 1);
        assert_eq!(netflix.total, 3);

        let spotify = listed.iter().find(|c| c.category.name == "spotify").unwrap();
        assert_eq!(spotify.total, 0);
    }

    #[tokio::test]
    async fn test_available_count_excludes_past_expiry() {
        let manager = create_test_manager().await;
        let cat = manager
            .create_category("netflix", None, "admin")
            .await
            .unwrap();
        seed_account(&manager, cat.id, "fresh@x.y", "available").await;

        // Insert one already-expired row directly
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO accounts (email, password, category_id, status, expires_at, created_at, updated_at)
             VALUES ('old@x.y', 'pw', ?1, 'available', ?2, ?3, ?3)",
        )
        .bind(cat.id)
        .bind(now - chrono::Duration::hours(1))
        .bind(now)
        .execute(&manager.db)
        .await
        .unwrap();

        assert_eq!(manager.count_available(cat.id).await.unwrap(), 1);

        let listed = manager.list_categories().await.unwrap();
        assert_eq!(listed[0].available, 1);
        assert_eq!(listed[0].total, 2);
    }

    #[tokio::test]
    async fn test_list_accounts_filters() {
        let manager = create_test_manager().await;
        let cat_a = manager
            .create_category("netflix", None, "admin")
            .await
            .unwrap();
        let cat_b = manager
            .create_category("spotify", None, "admin")
            .await
            .unwrap();

        seed_account(&manager, cat_a.id, "a@b.c", "available").await;
        seed_account(&manager, cat_a.id, "d@e.f", "generated").await;
        seed_account(&manager, cat_b.id, "g@h.i", "available").await;

        let all = manager.list_accounts(None, None, 50, 0).await.unwrap();
        assert_eq!(all.len(), 3);

        let only_a = manager
            .list_accounts(Some(cat_a.id), None, 50, 0)
            .await
            .unwrap();
        assert_eq!(only_a.len(), 2);

        let generated = manager
            .list_accounts(None, Some(AccountStatus::Generated), 50, 0)
            .await
            .unwrap();
        assert_eq!(generated.len(), 1);
        assert_eq!(generated[0].email, "d@e.f");
    }

    #[tokio::test]
    async fn test_update_category_description() {
        let manager = create_test_manager().await;
        let cat = manager
            .create_category("netflix", None, "admin")
            .await
            .unwrap();

        let updated = manager
            .update_category(cat.id, Some("streaming accounts"), "admin")
            .await
            .unwrap();
        assert_eq!(updated.description.as_deref(), Some("streaming accounts"));

        let result = manager.update_category(9999, None, "admin").await;
        match result.unwrap_err() {
            QmError::NotFound(_) => {}
            other => panic!("Expected NotFound error, got {:?}", other),
        }
    }
}
