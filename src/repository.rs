use crate::{
    models::{Role, SettingType, SettingsByCategory, SystemSetting, User},
    settings::{default_settings, group_by_category},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::sync::RwLock;

/// RepositoryError
///
/// Failure of the backing store. Callers never retry; the access guard turns any of these
/// into a denial and handlers into a 500.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("store unavailable")]
    Unavailable,
}

/// Repository Trait
///
/// The abstract contract over the user store (read-only, used by the access guard and the
/// login flow) and the settings store. Handlers and the guard only see `Arc<dyn Repository>`.
///
/// **Send + Sync + async_trait** are required so the trait object can be shared across
/// Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- User Store ---
    // Point lookup by the id embedded in a session token.
    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, RepositoryError>;
    // Used by the login flow only.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    // Keyed on the id: an existing record takes the new email, name, role and hash.
    async fn upsert_user(&self, user: &User) -> Result<(), RepositoryError>;

    // --- Settings Store ---
    async fn get_settings(&self) -> Result<SettingsByCategory, RepositoryError>;
    async fn find_setting(&self, key: &str) -> Result<Option<SystemSetting>, RepositoryError>;
    // Returns false when no setting with this key exists.
    async fn put_setting(&self, key: &str, value: Value) -> Result<bool, RepositoryError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

#[derive(FromRow)]
struct UserRow {
    id: String,
    email: String,
    name: Option<String>,
    role: String,
    password_hash: String,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|e| RepositoryError::Corrupt(format!("user {}: {}", row.id, e)))?;
        Ok(User {
            id: row.id,
            email: row.email,
            name: row.name,
            role,
            password_hash: row.password_hash,
        })
    }
}

#[derive(FromRow)]
struct SettingRow {
    key: String,
    category: String,
    value: Value,
    description: String,
    #[sqlx(rename = "type")]
    setting_type: String,
    updated_at: Option<DateTime<Utc>>,
}

impl SettingRow {
    fn into_entry(self) -> Result<(String, SystemSetting), RepositoryError> {
        let setting_type: SettingType = self
            .setting_type
            .parse()
            .map_err(|e| RepositoryError::Corrupt(format!("setting {}: {}", self.key, e)))?;
        Ok((
            self.category,
            SystemSetting {
                key: self.key,
                value: self.value,
                description: self.description,
                setting_type,
                updated_at: self.updated_at,
            },
        ))
    }
}

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// ensure_schema
    ///
    /// Creates the two tables if missing and seeds the settings catalog without touching
    /// values that already exist. Only called in `Env::Local`; production schemas are
    /// managed outside the service.
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT,
                role TEXT NOT NULL DEFAULT 'USER',
                password_hash TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS system_settings (
                key TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                value JSONB NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                type TEXT NOT NULL,
                updated_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for entry in default_settings() {
            sqlx::query(
                r#"
                INSERT INTO system_settings (key, category, value, description, type)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (key) DO NOTHING
                "#,
            )
            .bind(entry.key)
            .bind(entry.category)
            .bind(&entry.value)
            .bind(entry.description)
            .bind(entry.setting_type.as_str())
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, role, password_hash FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, role, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    /// upsert_user
    ///
    /// Inserts the user or, when the id exists, overwrites every other column. Used to
    /// bootstrap the local admin account, whose id stays fixed while its email may change.
    async fn upsert_user(&self, user: &User) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, role, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET email = EXCLUDED.email,
                name = EXCLUDED.name,
                role = EXCLUDED.role,
                password_hash = EXCLUDED.password_hash
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(&user.password_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// get_settings
    ///
    /// Reads the whole table; the settings set is small and the dashboard always shows
    /// every category.
    async fn get_settings(&self) -> Result<SettingsByCategory, RepositoryError> {
        let rows = sqlx::query_as::<_, SettingRow>(
            "SELECT key, category, value, description, type, updated_at FROM system_settings",
        )
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .into_iter()
            .map(SettingRow::into_entry)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(group_by_category(entries))
    }

    async fn find_setting(&self, key: &str) -> Result<Option<SystemSetting>, RepositoryError> {
        let row = sqlx::query_as::<_, SettingRow>(
            "SELECT key, category, value, description, type, updated_at FROM system_settings WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SettingRow::into_entry).transpose()?.map(|(_, s)| s))
    }

    async fn put_setting(&self, key: &str, value: Value) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE system_settings SET value = $2, updated_at = now() WHERE key = $1",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// InMemoryRepository
///
/// A process-local implementation used by tests and local demos. It can simulate an
/// unavailable store (`failing`) or a slow one (`with_latency`) so the guard's fail-closed
/// and timeout paths can be exercised without a database.
#[derive(Default)]
pub struct InMemoryRepository {
    users: RwLock<HashMap<String, User>>,
    // key -> (category, setting)
    settings: RwLock<BTreeMap<String, (String, SystemSetting)>>,
    should_fail: bool,
    latency: Option<Duration>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(mut self, users: impl IntoIterator<Item = User>) -> Self {
        let map = self.users.get_mut();
        for user in users {
            map.insert(user.id.clone(), user);
        }
        self
    }

    pub fn with_default_settings(mut self) -> Self {
        let map = self.settings.get_mut();
        for entry in default_settings() {
            map.insert(
                entry.key.to_string(),
                (entry.category.to_string(), entry.to_setting()),
            );
        }
        self
    }

    /// Every call returns `RepositoryError::Unavailable`.
    pub fn failing(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Every call sleeps this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    async fn simulate(&self) -> Result<(), RepositoryError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.should_fail {
            return Err(RepositoryError::Unavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        self.simulate().await?;
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        self.simulate().await?;
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn upsert_user(&self, user: &User) -> Result<(), RepositoryError> {
        self.simulate().await?;
        self.users.write().await.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get_settings(&self) -> Result<SettingsByCategory, RepositoryError> {
        self.simulate().await?;
        let settings = self.settings.read().await;
        Ok(group_by_category(settings.values().cloned()))
    }

    async fn find_setting(&self, key: &str) -> Result<Option<SystemSetting>, RepositoryError> {
        self.simulate().await?;
        Ok(self.settings.read().await.get(key).map(|(_, s)| s.clone()))
    }

    async fn put_setting(&self, key: &str, value: Value) -> Result<bool, RepositoryError> {
        self.simulate().await?;
        let mut settings = self.settings.write().await;
        match settings.get_mut(key) {
            Some((_, setting)) => {
                setting.value = value;
                setting.updated_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn admin() -> User {
        User {
            id: "u1".to_string(),
            email: "admin@example.com".to_string(),
            role: Role::Admin,
            ..User::default()
        }
    }

    #[tokio::test]
    async fn in_memory_finds_users_by_id_and_email() {
        let repo = InMemoryRepository::new().with_users([admin()]);
        assert_eq!(repo.find_user_by_id("u1").await.unwrap().unwrap().email, "admin@example.com");
        assert_eq!(repo.find_user_by_email("admin@example.com").await.unwrap().unwrap().id, "u1");
        assert!(repo.find_user_by_id("u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_the_record_with_the_same_id() {
        let repo = InMemoryRepository::new().with_users([admin()]);
        let renamed = User {
            email: "ops@example.com".to_string(),
            role: Role::SuperAdmin,
            ..admin()
        };
        repo.upsert_user(&renamed).await.unwrap();

        assert!(repo.find_user_by_email("admin@example.com").await.unwrap().is_none());
        let user = repo.find_user_by_email("ops@example.com").await.unwrap().unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.role, Role::SuperAdmin);
    }

    #[tokio::test]
    async fn in_memory_put_updates_existing_keys_only() {
        let repo = InMemoryRepository::new().with_default_settings();
        assert!(repo.put_setting("ai_timeout", json!(45_000)).await.unwrap());
        assert!(!repo.put_setting("no_such_key", json!(1)).await.unwrap());

        let setting = repo.find_setting("ai_timeout").await.unwrap().unwrap();
        assert_eq!(setting.value, json!(45_000));
        assert!(setting.updated_at.is_some());
    }

    #[tokio::test]
    async fn failing_store_reports_unavailable() {
        let repo = InMemoryRepository::new().with_users([admin()]).failing();
        assert!(matches!(
            repo.find_user_by_id("u1").await,
            Err(RepositoryError::Unavailable)
        ));
    }

    #[test]
    fn unknown_role_in_row_is_corrupt() {
        let row = UserRow {
            id: "u9".to_string(),
            email: "x@example.com".to_string(),
            name: None,
            role: "root".to_string(),
            password_hash: String::new(),
        };
        assert!(matches!(User::try_from(row), Err(RepositoryError::Corrupt(_))));
    }
}
