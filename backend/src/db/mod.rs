//! Database module for persisting download history and the last sync time

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::download::{DownloadItem, DownloadStatus};

/// Database wrapper for SQLite operations
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open the database in the configuration directory
    pub fn new() -> Result<Self> {
        Self::open(&Self::db_path())
    }

    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;

        Ok(db)
    }

    /// Get the database file path
    fn db_path() -> PathBuf {
        crate::config::config_dir().join("downloads.db")
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS downloads (
                enclosure_id INTEGER PRIMARY KEY,
                url TEXT NOT NULL,
                file_name TEXT NOT NULL,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                downloaded_bytes INTEGER NOT NULL DEFAULT 0,
                total_bytes INTEGER NOT NULL DEFAULT 0,
                file_path TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_downloads_updated_at ON downloads(updated_at);

            CREATE TABLE IF NOT EXISTS sync_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_sync_at TEXT
            );
            "#,
        )?;

        Ok(())
    }

    /// Insert or update a download. A missing file path keeps the stored one.
    pub fn upsert_download(&self, item: &DownloadItem) -> Result<()> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO downloads (
                enclosure_id, url, file_name, status, progress,
                downloaded_bytes, total_bytes, file_path, error, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            ON CONFLICT(enclosure_id) DO UPDATE SET
                url = excluded.url,
                file_name = excluded.file_name,
                status = excluded.status,
                progress = excluded.progress,
                downloaded_bytes = excluded.downloaded_bytes,
                total_bytes = excluded.total_bytes,
                file_path = COALESCE(excluded.file_path, downloads.file_path),
                error = excluded.error,
                updated_at = excluded.updated_at
            "#,
            rusqlite::params![
                item.enclosure_id,
                item.url,
                item.file_name,
                item.status.as_str(),
                item.progress,
                item.downloaded_bytes,
                item.total_bytes,
                item.file_path,
                item.error,
                now,
            ],
        )?;

        Ok(())
    }

    /// Load all downloads, oldest update first, ready for hydration
    pub fn load_history(&self) -> Result<Vec<DownloadItem>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            r#"
            SELECT enclosure_id, url, file_name, status, progress,
                   downloaded_bytes, total_bytes, file_path, error
            FROM downloads
            ORDER BY updated_at ASC, enclosure_id ASC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let status: String = row.get(3)?;
            Ok((
                status,
                DownloadItem {
                    enclosure_id: row.get(0)?,
                    url: row.get(1)?,
                    file_name: row.get(2)?,
                    status: DownloadStatus::Downloading,
                    progress: row.get(4)?,
                    downloaded_bytes: row.get(5)?,
                    total_bytes: row.get(6)?,
                    file_path: row.get(7)?,
                    error: row.get(8)?,
                    speed: None,
                },
            ))
        })?;

        let mut downloads = Vec::new();
        for row in rows {
            let (status, mut item) = row?;
            match status.parse::<DownloadStatus>() {
                Ok(status) => {
                    item.status = status;
                    downloads.push(item);
                }
                Err(e) => warn!(enclosure_id = item.enclosure_id, "Skipping stored download: {}", e),
            }
        }

        Ok(downloads)
    }

    /// Delete a download record
    pub fn delete_download(&self, enclosure_id: u64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM downloads WHERE enclosure_id = ?1",
            [enclosure_id],
        )?;
        Ok(())
    }

    /// Delete several download records in one transaction
    pub fn delete_downloads(&self, enclosure_ids: &[u64]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM downloads WHERE enclosure_id = ?1")?;
            for id in enclosure_ids {
                stmt.execute([id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Record the last successful sync time
    pub fn save_last_synced_at(&self, last_synced_at: Option<DateTime<Utc>>) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO sync_state (id, last_sync_at) VALUES (1, ?1)
            ON CONFLICT(id) DO UPDATE SET last_sync_at = excluded.last_sync_at
            "#,
            [last_synced_at.map(|at| at.to_rfc3339())],
        )?;

        Ok(())
    }

    /// Last successful sync time from a previous session
    pub fn load_last_synced_at(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock();

        let stored: Option<Option<String>> = conn
            .query_row("SELECT last_sync_at FROM sync_state WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        Ok(stored
            .flatten()
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }
}
