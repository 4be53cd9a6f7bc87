use std::sync::Arc;

use anyhow::{Context, Result};
use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::info;

use crate::schema::init_sql;

const IN_MEMORY_LIMIT: &str = "1GB";

/// DuckDB store for sites, view grants, numeric archives and report
/// snapshots.
///
/// One connection behind `Arc<Mutex<_>>`: handlers and the digest task share
/// the backend, DuckDB sees a single writer at a time.
pub struct DuckDbBackend {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl DuckDbBackend {
    fn from_connection(conn: Connection, memory_limit: &str) -> Result<Self> {
        conn.execute_batch(&init_sql(memory_limit))
            .context("applying multisites schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open (or create) the database file at `path`.
    ///
    /// `memory_limit` is a DuckDB size string such as `"1GB"` or `"512MB"`.
    pub fn open(path: &str, memory_limit: &str) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("opening {path}"))?;
        let backend = Self::from_connection(conn, memory_limit)?;
        info!(path, memory_limit, "DuckDB archive store opened");
        Ok(backend)
    }

    /// Throwaway database for tests. Data is discarded on drop.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, IN_MEMORY_LIMIT)
    }

    /// `SELECT 1` against the shared connection.
    pub async fn ping(&self) -> Result<()> {
        self.conn.lock().await.execute_batch("SELECT 1")?;
        Ok(())
    }

    /// Direct connection access for integration tests that inspect rows.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}
