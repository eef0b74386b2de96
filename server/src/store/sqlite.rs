//! SQLite-backed [`UserRegistry`].
//!
//! A single connection guarded by a mutex. Every call runs on the blocking
//! pool so the async runtime never waits on disk.
//!
//! # Invariants
//! - Users live in `users`; extra login keys (provider keys) live in
//!   `user_keys`. The `id`, `email` and `username` keys are answered from
//!   `users` directly and never stored as rows.
//! - Uniqueness of ids, emails, usernames and keys is enforced by the schema.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, ffi, params};

use super::UserRegistry;
use crate::error::{Error, Result};
use crate::identity::{
    KEY_KIND_EMAIL, KEY_KIND_ID, KEY_KIND_USERNAME, Key, User, UserData, split_auth_key,
};

const USER_COLUMNS: &str = "id, kind, user_data, email, pwd_hash, username, created_at, \
                            updated_at, verified_at, verify_token, attributes";

/// SQLite implementation of [`UserRegistry`].
#[derive(Clone)]
pub struct SqliteRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRegistry {
    /// Open (or create) the database file at `path`.
    ///
    /// # Errors
    /// Returns `InternalIssue` if the file cannot be opened or the schema
    /// cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| {
            Error::internal()
                .caused_by(e)
                .hint(format!("opening {}", path.display()))
        })?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;",
        )
        .map_err(translate_err)?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns `InternalIssue` if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(translate_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS users (
                id           TEXT PRIMARY KEY,
                kind         TEXT NOT NULL,
                user_data    TEXT NOT NULL DEFAULT '{}',
                email        TEXT NOT NULL UNIQUE,
                pwd_hash     TEXT,
                username     TEXT NOT NULL UNIQUE,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL,
                verified_at  TEXT,
                verify_token TEXT,
                attributes   TEXT NOT NULL DEFAULT '{}'
            );
            CREATE TABLE IF NOT EXISTS user_keys (
                key        TEXT PRIMARY KEY,
                user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                attribs    TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_user_keys_user_id ON user_keys(user_id);",
        )
        .map_err(translate_err)
    }

    /// Number of stored users.
    ///
    /// # Errors
    /// Returns `InternalIssue` on storage failure.
    pub async fn count_users(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
                .map_err(translate_err)?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
        .await
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::internal().caused_by(e).hint("storage task failed"))?
    }
}

#[async_trait]
impl UserRegistry for SqliteRegistry {
    async fn get(&self, key: &str) -> Result<User> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let (kind, value) = split_auth_key(&key);
            let column = match kind {
                KEY_KIND_ID => Some("id"),
                KEY_KIND_EMAIL => Some("email"),
                KEY_KIND_USERNAME => Some("username"),
                _ => None,
            };

            match column {
                Some(column) => select_user(conn, column, value),
                None => {
                    let user_id: String = conn
                        .query_row(
                            "SELECT user_id FROM user_keys WHERE key = ?1",
                            params![key],
                            |row| row.get(0),
                        )
                        .map_err(translate_err)?;
                    select_user(conn, "id", &user_id)
                }
            }
        })
        .await
    }

    async fn register(&self, user: User, keys: Vec<Key>) -> Result<User> {
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(translate_err)?;
            insert_user(&tx, &user)?;
            let now = Utc::now();
            for key in &keys {
                tx.execute(
                    "INSERT INTO user_keys (key, user_id, attribs, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        key.key,
                        user.id,
                        serde_json::Value::Object(key.attribs.clone()),
                        now
                    ],
                )
                .map_err(translate_err)?;
            }
            tx.commit().map_err(translate_err)?;
            Ok(user)
        })
        .await
    }

    async fn verify(&self, user_id: &str, token: &str) -> Result<User> {
        let user_id = user_id.to_string();
        let token = token.to_string();
        self.with_conn(move |conn| {
            let now = Utc::now();
            let updated = conn
                .execute(
                    "UPDATE users SET verified_at = ?1, verify_token = NULL, updated_at = ?1
                     WHERE id = ?2 AND verify_token = ?3",
                    params![now, user_id, token],
                )
                .map_err(translate_err)?;
            if updated == 0 {
                return Err(Error::not_found().hint("no user with matching verify token"));
            }
            select_user(conn, "id", &user_id)
        })
        .await
    }

    async fn set_password(&self, user_id: &str, password_hash: &str) -> Result<()> {
        let user_id = user_id.to_string();
        let password_hash = password_hash.to_string();
        self.with_conn(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE users SET pwd_hash = ?1, updated_at = ?2 WHERE id = ?3",
                    params![password_hash, Utc::now(), user_id],
                )
                .map_err(translate_err)?;
            expect_one_row(updated)
        })
        .await
    }

    async fn set_user_data(&self, user_id: &str, data: UserData) -> Result<()> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE users SET user_data = ?1, updated_at = ?2 WHERE id = ?3",
                    params![serde_json::Value::Object(data), Utc::now(), user_id],
                )
                .map_err(translate_err)?;
            expect_one_row(updated)
        })
        .await
    }
}

fn select_user(conn: &Connection, column: &str, value: &str) -> Result<User> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    conn.query_row(&sql, params![value], user_from_row)
        .optional()
        .map_err(translate_err)?
        .ok_or_else(|| Error::not_found().hint(format!("no user with {column} '{value}'")))
}

fn insert_user(conn: &Connection, user: &User) -> Result<()> {
    let sql = format!(
        "INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
    );
    conn.execute(
        &sql,
        params![
            user.id,
            user.kind,
            serde_json::Value::Object(user.data.clone()),
            user.email,
            user.password_hash,
            user.username,
            user.created_at,
            user.updated_at,
            user.verified_at,
            user.verify_token,
            serde_json::Value::Object(user.attributes.clone()),
        ],
    )
    .map_err(translate_err)?;
    Ok(())
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        kind: row.get("kind")?,
        data: into_map(row.get("user_data")?),
        email: row.get("email")?,
        password_hash: row.get("pwd_hash")?,
        username: row.get("username")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        verified_at: row.get("verified_at")?,
        verify_token: row.get("verify_token")?,
        attributes: into_map(row.get("attributes")?),
    })
}

fn into_map(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

fn expect_one_row(updated: usize) -> Result<()> {
    if updated == 0 {
        return Err(Error::not_found().hint("no such user"));
    }
    Ok(())
}

/// Map a SQLite error onto the registry's error kinds.
fn translate_err(err: rusqlite::Error) -> Error {
    match &err {
        rusqlite::Error::QueryReturnedNoRows => Error::not_found(),
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == ErrorCode::ConstraintViolation
                && matches!(
                    failure.extended_code,
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                ) =>
        {
            Error::conflict().hint(message.clone().unwrap_or_default())
        }
        _ => Error::internal().caused_by(err),
    }
}
