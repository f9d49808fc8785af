use serde::Serialize;
use sqlx::sqlite::SqlitePool;

/// A stored PKCE challenge, one per origin host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PkceRecord {
    pub id: String,
    pub host: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

/// Store for PKCE challenges keyed by host.
///
/// The `host` column is unique, so concurrent first-contact writes from the
/// same origin resolve to a single record.
#[derive(Clone)]
pub struct PkceStore {
    pool: SqlitePool,
}

impl PkceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a challenge for a host unless one already exists.
    /// Returns whether a new record was written.
    pub async fn insert_if_absent(
        &self,
        host: &str,
        code_challenge: &str,
        code_challenge_method: &str,
    ) -> Result<bool, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let result = sqlx::query(
            "INSERT OR IGNORE INTO pkce (id, host, code_challenge, code_challenge_method)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(host)
        .bind(code_challenge)
        .bind(code_challenge_method)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_by_host(&self, host: &str) -> Result<Option<PkceRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, host, code_challenge, code_challenge_method FROM pkce WHERE host = ?",
        )
        .bind(host)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<PkceRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, host, code_challenge, code_challenge_method FROM pkce WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list(&self) -> Result<Vec<PkceRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, host, code_challenge, code_challenge_method FROM pkce ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Delete a record. Returns the deleted record, if any.
    pub async fn delete(&self, id: &str) -> Result<Option<PkceRecord>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let record: Option<PkceRecord> = sqlx::query_as(
            "SELECT id, host, code_challenge, code_challenge_method FROM pkce WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if record.is_some() {
            sqlx::query("DELETE FROM pkce WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(record)
    }
}
