mod pkce;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use pkce::{PkceRecord, PkceStore};
pub use user::{User, UserStore, UserUpdate, is_unique_violation};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let options = SqlitePoolOptions::new().min_connections(1).idle_timeout(None);

        let pool = if path == ":memory:" {
            // Every connection to `sqlite::memory:` sees its own database, so the
            // single connection must never be recycled.
            options
                .max_connections(1)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?
        } else {
            options
                .max_connections(5)
                .connect(&format!("sqlite:{}?mode=rwc", path))
                .await?
        };

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        if self.get_version().await? < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let queries = [
            "CREATE TABLE users (
                id TEXT PRIMARY KEY NOT NULL,
                username TEXT UNIQUE,
                email TEXT UNIQUE,
                phone TEXT UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            // One live challenge per origin host.
            "CREATE TABLE pkce (
                id TEXT PRIMARY KEY NOT NULL,
                host TEXT UNIQUE NOT NULL,
                code_challenge TEXT NOT NULL,
                code_challenge_method TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            "DELETE FROM schema_version",
            "INSERT INTO schema_version (version) VALUES (1)",
        ];
        for query in queries {
            sqlx::query(query).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the PKCE challenge store.
    pub fn pkce(&self) -> PkceStore {
        PkceStore::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentityField, UserIdentity};

    fn username(name: &str) -> UserIdentity {
        UserIdentity {
            username: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open(":memory:").await.unwrap();

        let user = db.users().create(&username("alice"), "hash").await.unwrap();

        let fetched = db.users().get_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(fetched, user);

        let (found, hash) = db
            .users()
            .get_credentials(IdentityField::Username, "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(hash, "hash");
    }

    #[tokio::test]
    async fn test_duplicate_username_fails() {
        let db = Database::open(":memory:").await.unwrap();

        db.users().create(&username("alice"), "hash").await.unwrap();
        let err = db.users().create(&username("alice"), "hash").await.unwrap_err();

        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_users_without_email_do_not_conflict() {
        let db = Database::open(":memory:").await.unwrap();

        db.users().create(&username("alice"), "hash").await.unwrap();
        db.users().create(&username("bob"), "hash").await.unwrap();

        assert_eq!(db.users().list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let db = Database::open(":memory:").await.unwrap();

        db.users().create(&username("Alice"), "hash").await.unwrap();
        db.users().create(&username("malice"), "hash").await.unwrap();
        db.users().create(&username("bob"), "hash").await.unwrap();

        let found = db.users().search(IdentityField::Username, "ALI").await.unwrap();
        assert_eq!(found.len(), 2);

        let none = db.users().search(IdentityField::Username, "%").await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_update_and_delete_user() {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.users().create(&username("alice"), "hash").await.unwrap();

        let update = UserUpdate {
            identity: UserIdentity {
                email: Some("alice@example.com".into()),
                ..Default::default()
            },
            password_hash: Some("new-hash".into()),
        };
        let updated = db.users().update(&user.id, &update).await.unwrap().unwrap();
        assert_eq!(updated.identity.username.as_deref(), Some("alice"));
        assert_eq!(updated.identity.email.as_deref(), Some("alice@example.com"));

        let (_, hash) = db
            .users()
            .get_credentials(IdentityField::Email, "alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hash, "new-hash");

        assert!(db.users().delete(&user.id).await.unwrap());
        assert!(!db.users().delete(&user.id).await.unwrap());
        assert!(db.users().get_by_id(&user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_connection_is_never_recycled() {
        let db = Database::open(":memory:").await.unwrap();
        let options = db.pool.options();

        assert_eq!(options.get_max_connections(), 1);
        assert!(options.get_max_lifetime().is_none());
        assert!(options.get_idle_timeout().is_none());

        db.pkce().insert_if_absent("client.example", "X", "S256").await.unwrap();
        assert!(db.pkce().get_by_host("client.example").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reopen_runs_migrations_once() {
        let db = Database::open(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        assert_eq!(db.get_version().await.unwrap(), 1);
    }
}
