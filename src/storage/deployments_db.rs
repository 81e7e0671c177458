//! Sqlite-backed [`ResultStore`].
//!
//! One table, keyed by the stable cache key. Connections are opened per
//! operation with a busy timeout and a short retry loop on lock contention;
//! write volume is one row per distinct query, so there is no need for a
//! background writer.

use crate::error::StoreError;
use crate::storage::ResultStore;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const SQLITE_BUSY_TIMEOUT_MS: u64 = 5_000;
const SQLITE_LOCKED_MAX_ATTEMPTS: u32 = 6;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn is_sqlite_locked_error(err: &rusqlite::Error) -> bool {
    use rusqlite::ffi::ErrorCode;
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.with_connection("ensure_schema", |conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS deployment_blocks (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL,
                    stored_at_ms INTEGER NOT NULL
                );
                "#,
            )?;
            // WAL keeps concurrent readers off the writer's back.
            let _ = conn.execute_batch(
                r#"
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                "#,
            );
            Ok(())
        })
    }

    fn with_connection<T, F>(&self, context: &str, op: F) -> Result<T, StoreError>
    where
        F: Fn(&Connection) -> rusqlite::Result<T>,
    {
        let mut last_message = String::new();
        for attempt in 1..=SQLITE_LOCKED_MAX_ATTEMPTS {
            let conn = Connection::open(&self.path).map_err(|err| StoreError::Sqlite {
                context: context.to_string(),
                message: format!("open {} failed: {}", self.path.display(), err),
            })?;
            conn.busy_timeout(Duration::from_millis(SQLITE_BUSY_TIMEOUT_MS))
                .map_err(|err| StoreError::Sqlite {
                    context: context.to_string(),
                    message: format!("busy_timeout failed: {err}"),
                })?;

            match op(&conn) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    last_message = err.to_string();
                    if is_sqlite_locked_error(&err) && attempt < SQLITE_LOCKED_MAX_ATTEMPTS {
                        continue;
                    }
                    return Err(StoreError::Sqlite {
                        context: context.to_string(),
                        message: last_message,
                    });
                }
            }
        }
        Err(StoreError::Sqlite {
            context: context.to_string(),
            message: format!(
                "still locked after {} attempt(s): {}",
                SQLITE_LOCKED_MAX_ATTEMPTS, last_message
            ),
        })
    }
}

impl ResultStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_connection("get", |conn| {
            conn.query_row(
                "SELECT value FROM deployment_blocks WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.with_connection("set", |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO deployment_blocks (key, value, stored_at_ms) VALUES (?1, ?2, ?3)",
                params![key, value, now_ms() as i64],
            )
            .map(|_| ())
        })
    }
}
