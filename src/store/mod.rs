//! Persistent SQLite storage: catalog, subscriptions, pending uploads and the
//! payment ledger.
//!
//! One connection sits behind a mutex and is shared by the bot dispatcher and
//! the webhook server. Every multi-statement write runs in an immediate
//! transaction.

mod catalog;
mod payments;
mod pending;
mod subscriptions;

pub use catalog::{AnimeEntry, DubEntry, DubSelection, EpisodeEntry, NewEpisode, SeasonEntry, Video};
pub use payments::{Payment, PaymentStatus, Provider, Settlement};
pub use pending::{AssignedRange, BatchAssign};
pub use subscriptions::{Registration, Subscription};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

#[derive(Debug)]
pub enum StoreError {
    /// Failed to open the database file.
    Open { path: PathBuf, source: rusqlite::Error },
    Sqlite(rusqlite::Error),
    /// Batch assignment found nothing in the pending area.
    NoPendingVideos,
    /// A stored value could not be interpreted.
    InvalidRow(String),
    /// A date or episode number would leave its representable range.
    OutOfRange(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { path, source } => {
                write!(f, "failed to open database '{}': {}", path.display(), source)
            }
            Self::Sqlite(e) => write!(f, "sqlite error: {e}"),
            Self::NoPendingVideos => write!(f, "no pending videos"),
            Self::InvalidRow(msg) => write!(f, "invalid row: {msg}"),
            Self::OutOfRange(msg) => write!(f, "out of range: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open { source, .. } => Some(source),
            Self::Sqlite(e) => Some(e),
            Self::NoPendingVideos | Self::InvalidRow(_) | Self::OutOfRange(_) => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

/// Row counts reported at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub videos: usize,
    pub users: usize,
    pub subscriptions: usize,
    pub pending: usize,
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self::from_connection(conn)?;

        let stats = db.stats()?;
        info!(
            "Loaded database from {:?} ({} videos, {} users, {} subscriptions, {} pending)",
            path, stats.videos, stats.users, stats.subscriptions, stats.pending
        );
        Ok(db)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema()?;
        Ok(db)
    }

    /// The connection guard; a poisoned lock still holds a usable connection.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn();

        conn.execute_batch(
            r#"
            PRAGMA busy_timeout = 5000;

            CREATE TABLE IF NOT EXISTS videos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                anime TEXT NOT NULL,
                anime_key TEXT NOT NULL,
                dub TEXT NOT NULL,
                season TEXT NOT NULL,
                season_key TEXT NOT NULL,
                dub_key TEXT NOT NULL,
                episode INTEGER NOT NULL,
                file_ref TEXT NOT NULL,
                added_at INTEGER NOT NULL,
                UNIQUE(anime, dub, season, episode)
            );

            CREATE TABLE IF NOT EXISTS titles (
                anime_key TEXT PRIMARY KEY,
                title_en TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                first_seen INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS subscriptions (
                user_id INTEGER PRIMARY KEY,
                plan TEXT NOT NULL,
                expires_at INTEGER,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pending_videos (
                message_id INTEGER PRIMARY KEY,
                file_ref TEXT NOT NULL,
                received_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                provider TEXT NOT NULL,
                external_id TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                plan TEXT NOT NULL,
                amount_rub INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at INTEGER NOT NULL,
                settled_at INTEGER,
                UNIQUE(provider, external_id)
            );

            CREATE INDEX IF NOT EXISTS idx_videos_anime_key ON videos(anime_key);
            CREATE INDEX IF NOT EXISTS idx_videos_season_key ON videos(season_key);
            CREATE INDEX IF NOT EXISTS idx_videos_dub_key ON videos(dub_key, episode);
            CREATE INDEX IF NOT EXISTS idx_videos_anime ON videos(anime);
            CREATE INDEX IF NOT EXISTS idx_pending_received ON pending_videos(received_at);
            CREATE INDEX IF NOT EXISTS idx_payments_user ON payments(user_id);
            "#,
        )?;
        Ok(())
    }

    pub fn stats(&self) -> Result<Stats, StoreError> {
        let conn = self.conn();
        let count = |table: &str| -> Result<usize, StoreError> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(Stats {
            videos: count("videos")?,
            users: count("users")?,
            subscriptions: count("subscriptions")?,
            pending: count("pending_videos")?,
        })
    }
}

pub(crate) fn to_ts(t: DateTime<Utc>) -> i64 {
    t.timestamp()
}

pub(crate) fn from_ts(ts: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(ts, 0).ok_or_else(|| StoreError::InvalidRow(format!("timestamp out of range: {ts}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let db = Database::in_memory().unwrap();
        db.init_schema().unwrap();
        assert_eq!(
            db.stats().unwrap(),
            Stats { videos: 0, users: 0, subscriptions: 0, pending: 0 }
        );
    }

    #[test]
    fn test_open_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anime.db");
        {
            let db = Database::open(&path).unwrap();
            db.add_pending(1, "file-1", Utc::now()).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.stats().unwrap().pending, 1);
    }
}
