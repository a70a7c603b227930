use super::traits::StorageError;
use crate::event::{AttributeValue, Event, SharedEvent};
use chrono::DateTime;
use duckdb::{params, Connection};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Event table in an embedded DuckDB database.
pub struct DuckDbStorage {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::file(parent, e))?;
        }

        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory DuckDB storage instance (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let conn = conn.lock().unwrap();
            conn.execute(
                "CREATE TABLE IF NOT EXISTS events (
                    created_at TIMESTAMP NOT NULL,
                    name VARCHAR NOT NULL,
                    attributes VARCHAR NOT NULL
                )",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at)",
                [],
            )?;
            Ok(())
        })
        .await?
    }

    /// Insert events in a single transaction
    pub async fn write_events(&self, events: Vec<SharedEvent>) -> Result<usize, StorageError> {
        if events.is_empty() {
            return Ok(0);
        }

        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<usize, StorageError> {
            let mut conn = conn.lock().unwrap();
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO events (created_at, name, attributes) VALUES (epoch_ms(CAST(? AS BIGINT)), ?, ?)",
                )?;
                for event in &events {
                    let attributes = serde_json::to_string(&event.attributes)?;
                    stmt.execute(params![
                        event.created_at.timestamp_millis(),
                        event.name,
                        attributes
                    ])?;
                }
            }
            tx.commit()?;
            Ok(events.len())
        })
        .await?
    }

    pub async fn count_events(&self) -> Result<u64, StorageError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<u64, StorageError> {
            let conn = conn.lock().unwrap();
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await?
    }

    /// All stored events ordered by creation time
    pub async fn load_events(&self) -> Result<Vec<Event>, StorageError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Event>, StorageError> {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT epoch_ms(created_at), name, attributes FROM events ORDER BY created_at",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;

            let mut events = Vec::new();
            for row in rows {
                let (millis, name, attributes) = row?;
                let created_at = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                    StorageError::InvalidData {
                        path: "events".into(),
                        message: format!("timestamp {} out of range", millis),
                    }
                })?;
                let attributes: BTreeMap<String, AttributeValue> = serde_json::from_str(&attributes)?;
                events.push(Event {
                    created_at,
                    name,
                    attributes,
                });
            }
            Ok(events)
        })
        .await?
    }
}
