//! SQLite database for the task history log

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::providers::HistorySink;
use crate::types::{DataType, HistoryItem};

/// SQLite-backed history of completed tasks
#[derive(Clone)]
pub struct HistoryDb {
    conn: Arc<Mutex<Connection>>,
}

/// Row counts per data type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryDbStats {
    pub total: usize,
    pub images: usize,
    pub texts: usize,
    pub files: usize,
}

impl HistoryDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        tracing::debug!("History database opened at {}", path.display());
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Internal(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
        "#).map_err(|e| Error::Internal(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS history (
                id TEXT PRIMARY KEY,
                file_name TEXT NOT NULL,
                file_path TEXT,
                date_time TEXT NOT NULL,
                data_type TEXT NOT NULL,
                host TEXT,
                url TEXT,
                thumbnail_url TEXT,
                deletion_url TEXT,
                shortened_url TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_history_date_time ON history(date_time);
        "#).map_err(|e| Error::Internal(format!("Failed to create tables: {}", e)))?;

        Ok(())
    }

    /// Insert an entry, replacing any previous entry with the same id
    pub fn insert(&self, item: &HistoryItem) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT OR REPLACE INTO history (
                id, file_name, file_path, date_time, data_type,
                host, url, thumbnail_url, deletion_url, shortened_url
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                item.id.to_string(),
                item.file_name,
                item.file_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
                item.date_time.to_rfc3339(),
                item.data_type.as_str(),
                item.host,
                item.url,
                item.thumbnail_url,
                item.deletion_url,
                item.shortened_url,
            ],
        )?;

        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Result<Option<HistoryItem>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT * FROM history WHERE id = ?1"
        )?;

        let item = stmt.query_row(params![id.to_string()], row_to_history_item)
            .optional()?;

        Ok(item)
    }

    /// Newest entries first
    pub fn list_recent(&self, limit: usize) -> Result<Vec<HistoryItem>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT * FROM history ORDER BY date_time DESC, rowid DESC LIMIT ?1"
        )?;

        let items = stmt.query_map(params![limit as i64], row_to_history_item)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(items)
    }

    /// Delete entries older than `days_to_keep` days, returning how many were removed
    pub fn prune(&self, days_to_keep: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let cutoff = (Utc::now() - chrono::Duration::days(days_to_keep)).to_rfc3339();

        let removed = conn.execute(
            "DELETE FROM history WHERE date_time < ?1",
            params![cutoff],
        )?;

        if removed > 0 {
            tracing::info!("Pruned {} history entries older than {} days", removed, days_to_keep);
        }
        Ok(removed)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;

        Ok(count as usize)
    }

    pub fn stats(&self) -> Result<HistoryDbStats> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT data_type, COUNT(*) FROM history GROUP BY data_type"
        )?;

        let rows = stmt.query_map([], |row| {
            let data_type: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((data_type, count as usize))
        })?;

        let mut stats = HistoryDbStats::default();
        for (data_type, count) in rows.filter_map(|r| r.ok()) {
            stats.total += count;
            match string_to_data_type(&data_type) {
                DataType::Image => stats.images += count,
                DataType::Text => stats.texts += count,
                DataType::File => stats.files += count,
            }
        }

        Ok(stats)
    }
}

impl HistorySink for HistoryDb {
    fn append(&self, item: &HistoryItem) -> Result<()> {
        self.insert(item)
    }

    fn recent(&self, limit: usize) -> Result<Vec<HistoryItem>> {
        self.list_recent(limit)
    }
}

fn row_to_history_item(row: &rusqlite::Row) -> rusqlite::Result<HistoryItem> {
    let id_str: String = row.get(0)?;
    let file_name: String = row.get(1)?;
    let file_path: Option<String> = row.get(2)?;
    let date_time_str: String = row.get(3)?;
    let data_type_str: String = row.get(4)?;

    Ok(HistoryItem {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::new_v4()),
        file_name,
        file_path: file_path.map(PathBuf::from),
        date_time: DateTime::parse_from_rfc3339(&date_time_str)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        data_type: string_to_data_type(&data_type_str),
        host: row.get(5)?,
        url: row.get(6)?,
        thumbnail_url: row.get(7)?,
        deletion_url: row.get(8)?,
        shortened_url: row.get(9)?,
    })
}

fn string_to_data_type(s: &str) -> DataType {
    match s {
        "image" => DataType::Image,
        "text" => DataType::Text,
        _ => DataType::File,
    }
}
