use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::series::SeriesSnapshot;

/// SQLite-backed key/value store for leaderboard buffers.
#[derive(Clone)]
pub struct SeriesStore {
    conn: Arc<Mutex<Connection>>,
}

impl SeriesStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).context("open series db")?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory series db")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS leaderboard_series (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn save(&self, key: &str, snapshot: &SeriesSnapshot, updated_at: i64) -> Result<()> {
        let payload = serde_json::to_string(snapshot).context("encode series snapshot")?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO leaderboard_series (key, payload, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at",
            params![key, payload, updated_at],
        )?;
        debug!(key, "leaderboard series saved");
        Ok(())
    }

    pub async fn load(&self, key: &str) -> Result<Option<SeriesSnapshot>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare_cached("SELECT payload FROM leaderboard_series WHERE key = ?1 LIMIT 1")?;
        let mut rows = stmt.query(params![key])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let payload: String = row.get(0)?;
        let snapshot = serde_json::from_str(&payload)
            .with_context(|| format!("decode series snapshot for {}", key))?;
        Ok(Some(snapshot))
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM leaderboard_series WHERE key = ?1", params![key])?;
        Ok(())
    }
}
