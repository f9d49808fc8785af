use serde::Serialize;
use sqlx::sqlite::SqlitePool;

use crate::identity::{IdentityField, UserIdentity};

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// Public view of a user record. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    #[serde(flatten)]
    pub identity: UserIdentity,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            identity: UserIdentity {
                username: row.username,
                email: row.email,
                phone: row.phone,
            },
        }
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: String,
    username: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    password_hash: String,
}

/// Fields to change on a user. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub identity: UserIdentity,
    pub password_hash: Option<String>,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user. Fails with a unique-constraint error if any
    /// identifying value is already taken.
    pub async fn create(
        &self,
        identity: &UserIdentity,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO users (id, username, email, phone, password_hash) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(identity.get(IdentityField::Username))
        .bind(identity.get(IdentityField::Email))
        .bind(identity.get(IdentityField::Phone))
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        Ok(User {
            id,
            identity: identity.clone(),
        })
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, username, email, phone FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Look up a user and their password hash by an exact identifying value.
    pub async fn get_credentials(
        &self,
        field: IdentityField,
        value: &str,
    ) -> Result<Option<(User, String)>, sqlx::Error> {
        let sql = match field {
            IdentityField::Username => {
                "SELECT id, username, email, phone, password_hash FROM users WHERE username = ?"
            }
            IdentityField::Email => {
                "SELECT id, username, email, phone, password_hash FROM users WHERE email = ?"
            }
            IdentityField::Phone => {
                "SELECT id, username, email, phone, password_hash FROM users WHERE phone = ?"
            }
        };
        let row: Option<CredentialRow> = sqlx::query_as(sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| {
            let user = User {
                id: r.id,
                identity: UserIdentity {
                    username: r.username,
                    email: r.email,
                    phone: r.phone,
                },
            };
            (user, r.password_hash)
        }))
    }

    pub async fn list(&self) -> Result<Vec<User>, sqlx::Error> {
        let rows: Vec<UserRow> =
            sqlx::query_as("SELECT id, username, email, phone FROM users ORDER BY rowid")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    /// Users whose `field` contains `text`, case-insensitively.
    pub async fn search(&self, field: IdentityField, text: &str) -> Result<Vec<User>, sqlx::Error> {
        let pattern = format!("%{}%", escape_like(text));
        let sql = match field {
            IdentityField::Username => {
                "SELECT id, username, email, phone FROM users
                 WHERE username LIKE ? ESCAPE '\\' ORDER BY rowid"
            }
            IdentityField::Email => {
                "SELECT id, username, email, phone FROM users
                 WHERE email LIKE ? ESCAPE '\\' ORDER BY rowid"
            }
            IdentityField::Phone => {
                "SELECT id, username, email, phone FROM users
                 WHERE phone LIKE ? ESCAPE '\\' ORDER BY rowid"
            }
        };
        let rows: Vec<UserRow> = sqlx::query_as(sql)
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    /// Apply an update. Returns the updated user, or None if it does not exist.
    pub async fn update(&self, id: &str, update: &UserUpdate) -> Result<Option<User>, sqlx::Error> {
        sqlx::query(
            "UPDATE users SET
                username = COALESCE(?, username),
                email = COALESCE(?, email),
                phone = COALESCE(?, phone),
                password_hash = COALESCE(?, password_hash)
             WHERE id = ?",
        )
        .bind(update.identity.get(IdentityField::Username))
        .bind(update.identity.get(IdentityField::Email))
        .bind(update.identity.get(IdentityField::Phone))
        .bind(update.password_hash.as_deref())
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_by_id(id).await
    }

    /// Delete a user. Returns whether a row was removed.
    pub async fn delete(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// True if the error is a unique-constraint violation.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
