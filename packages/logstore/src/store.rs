//! SQLite-backed log store.
//!
//! The store wraps an explicitly constructed connection pool with an
//! open/close lifecycle. Components that need it receive a cloned handle;
//! there is no process-global connection anywhere in this crate.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, SqlitePool};

use crate::entry::{LogEntry, NewLogEntry};
use crate::error::{Result, StoreError};

/// Handle to the persistent log store.
#[derive(Clone)]
pub struct LogStore {
    pool: SqlitePool,
}

impl LogStore {
    /// Opens the store at `url` (e.g. `sqlite:logs.db?mode=rwc`), creating
    /// the schema if needed.
    pub async fn open(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|source| StoreError::Open {
                url: url.to_string(),
                source,
            })?;
        let store = LogStore { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// In-memory store for tests and development.
    ///
    /// Uses a single connection: every pooled connection to
    /// `sqlite::memory:` sees its own empty database, so a larger pool
    /// would silently shard the data.
    pub async fn in_memory() -> Result<Self> {
        let url = "sqlite::memory:";
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(url)
            .await
            .map_err(|source| StoreError::Open {
                url: url.to_string(),
                source,
            })?;
        let store = LogStore { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                level TEXT NOT NULL,
                target TEXT NOT NULL,
                message TEXT NOT NULL,
                file TEXT,
                line INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs (timestamp, id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Closes the pool. Writers racing a close see query errors, which the
    /// tracing layer reroutes to stderr.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn insert(&self, entry: &NewLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO logs (timestamp, level, target, message, file, line) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(format_timestamp(&entry.timestamp))
        .bind(entry.level.as_str())
        .bind(&entry.target)
        .bind(&entry.message)
        .bind(&entry.file)
        .bind(entry.line)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Total rows currently stored.
    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Total bytes the database occupies, from SQLite's page accounting.
    pub async fn size_bytes(&self) -> Result<u64> {
        let (page_count,): (i64,) = sqlx::query_as("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;
        let (page_size,): (i64,) = sqlx::query_as("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;
        Ok(page_count.max(0) as u64 * page_size.max(0) as u64)
    }

    /// Most recent entries, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<LogEntry>> {
        let rows: Vec<LogRow> = sqlx::query_as(
            "SELECT id, timestamp, level, target, message, file, line FROM logs \
             ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LogRow::into_entry).collect()
    }

    /// Deletes the `limit` oldest rows (timestamp order, identifier as the
    /// tie-break) and reports how many went.
    pub(crate) async fn delete_oldest(&self, limit: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM logs WHERE id IN \
             (SELECT id FROM logs ORDER BY timestamp ASC, id ASC LIMIT ?)",
        )
        .bind(limit)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Fixed-precision RFC 3339, so lexicographic order matches time order.
fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Raw row shape; mapped to [`LogEntry`] field-by-field.
#[derive(Debug, FromRow)]
struct LogRow {
    id: i64,
    timestamp: String,
    level: String,
    target: String,
    message: String,
    file: Option<String>,
    line: Option<i64>,
}

impl LogRow {
    fn into_entry(self) -> Result<LogEntry> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|_| StoreError::CorruptTimestamp {
                id: self.id,
                value: self.timestamp.clone(),
            })?
            .with_timezone(&Utc);
        Ok(LogEntry {
            id: self.id,
            timestamp,
            level: self.level,
            target: self.target,
            message: self.message,
            file: self.file,
            line: self.line,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::LogLevel;

    fn entry(message: &str) -> NewLogEntry {
        NewLogEntry {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            target: "logstore::tests".to_string(),
            message: message.to_string(),
            file: Some("store.rs".to_string()),
            line: Some(1),
        }
    }

    #[tokio::test]
    async fn insert_and_read_back() {
        let store = LogStore::in_memory().await.unwrap();
        store.insert(&entry("first")).await.unwrap();
        store.insert(&entry("second")).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);

        let recent = store.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "second");
        assert_eq!(recent[0].level, "INFO");
        assert_eq!(recent[0].file.as_deref(), Some("store.rs"));
        assert_eq!(recent[1].message, "first");
        assert!(recent[0].id > recent[1].id);
    }

    #[tokio::test]
    async fn size_accounting_reports_nonzero_pages() {
        let store = LogStore::in_memory().await.unwrap();
        store.insert(&entry("payload")).await.unwrap();
        assert!(store.size_bytes().await.unwrap() > 0);
    }

    #[tokio::test]
    async fn delete_oldest_respects_timestamp_then_id_order() {
        let store = LogStore::in_memory().await.unwrap();
        // Same timestamp for every row forces the identifier tie-break.
        let timestamp = Utc::now();
        for i in 0..10 {
            let mut row = entry(&format!("m{i}"));
            row.timestamp = timestamp;
            store.insert(&row).await.unwrap();
        }

        assert_eq!(store.delete_oldest(4).await.unwrap(), 4);

        let remaining = store.recent(100).await.unwrap();
        assert_eq!(remaining.len(), 6);
        let min_id = remaining.iter().map(|e| e.id).min().unwrap();
        assert_eq!(min_id, 5);
    }

    #[tokio::test]
    async fn file_backed_store_opens_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", tmp.path().join("logs.db").display());

        let store = LogStore::open(&url).await.unwrap();
        store.insert(&entry("persisted")).await.unwrap();
        store.close().await;

        let reopened = LogStore::open(&url).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }
}
