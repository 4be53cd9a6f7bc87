use anyhow::Result;
use serde::Serialize;

use crate::DuckDbBackend;

/// A persisted report, as produced by the scheduled digest.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSnapshot {
    pub id: String,
    pub login: Option<String>,
    pub period: String,
    pub date: String,
    pub created_at: String,
    pub payload: serde_json::Value,
}

impl DuckDbBackend {
    pub async fn save_snapshot(
        &self,
        login: Option<&str>,
        period: &str,
        date: &str,
        payload: &serde_json::Value,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let payload = serde_json::to_string(payload)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO report_snapshots (id, login, period, date, created_at, payload) \
             VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP, ?5)",
            duckdb::params![id, login, period, date, payload],
        )?;
        Ok(id)
    }

    /// Most recent snapshots first.
    pub async fn list_snapshots(&self, limit: i64) -> Result<Vec<ReportSnapshot>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, login, period, date, CAST(created_at AS VARCHAR), payload \
             FROM report_snapshots ORDER BY created_at DESC, id LIMIT ?1",
        )?;
        let rows = stmt.query_map(duckdb::params![limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut snapshots = Vec::new();
        for row in rows {
            let (id, login, period, date, created_at, payload) = row?;
            snapshots.push(ReportSnapshot {
                id,
                login,
                period,
                date,
                created_at,
                payload: serde_json::from_str(&payload)?,
            });
        }
        Ok(snapshots)
    }
}
