use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use multisites_core::site::{SiteDirectory, SiteId, SiteInfo, SiteMatch, SiteSearch};

use crate::DuckDbBackend;

/// Login holding the view grants of visitors who are not logged in.
pub const ANONYMOUS_LOGIN: &str = "anonymous";

const SITE_COLUMNS: &str =
    "idsite, name, main_url, ecommerce, group_name, CAST(created_at AS VARCHAR)";

#[derive(Debug, Clone, Serialize)]
pub struct Site {
    pub idsite: SiteId,
    pub name: String,
    pub main_url: Option<String>,
    pub ecommerce: bool,
    pub group: Option<String>,
    pub created_at: String,
}

impl From<Site> for SiteInfo {
    fn from(site: Site) -> Self {
        SiteInfo {
            id: site.idsite,
            name: site.name,
            main_url: site.main_url,
            ecommerce: site.ecommerce,
            group: site.group,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateSiteParams {
    pub name: String,
    pub main_url: Option<String>,
    pub ecommerce: bool,
    pub group: Option<String>,
}

fn site_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Site> {
    Ok(Site {
        idsite: row.get(0)?,
        name: row.get(1)?,
        main_url: row.get(2)?,
        ecommerce: row.get(3)?,
        group: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn select_site(conn: &duckdb::Connection, idsite: SiteId) -> Result<Option<Site>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {SITE_COLUMNS} FROM sites WHERE idsite = ?1"))?;
    match stmt.query_row(duckdb::params![idsite], site_from_row) {
        Ok(site) => Ok(Some(site)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn collect_ids(
    conn: &duckdb::Connection,
    sql: &str,
    params: &[&dyn duckdb::types::ToSql],
) -> Result<Vec<SiteId>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| row.get::<_, SiteId>(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

impl DuckDbBackend {
    pub async fn create_site(&self, params: CreateSiteParams) -> Result<Site> {
        let conn = self.conn.lock().await;
        let idsite: SiteId = conn
            .prepare("SELECT nextval('sites_idsite_seq')")?
            .query_row([], |row| row.get(0))?;

        conn.execute(
            "INSERT INTO sites (idsite, name, main_url, ecommerce, group_name, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, CURRENT_TIMESTAMP)",
            duckdb::params![
                idsite,
                params.name,
                params.main_url,
                params.ecommerce,
                params.group
            ],
        )?;

        select_site(&conn, idsite)?
            .ok_or_else(|| anyhow::anyhow!("site {idsite} vanished after insert"))
    }

    /// Insert or overwrite a site with a fixed id. Used by tests and imports.
    pub async fn seed_site(&self, idsite: SiteId, params: CreateSiteParams) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO sites (idsite, name, main_url, ecommerce, group_name) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT (idsite) DO UPDATE SET name = excluded.name, \
             main_url = excluded.main_url, ecommerce = excluded.ecommerce, \
             group_name = excluded.group_name",
            duckdb::params![
                idsite,
                params.name,
                params.main_url,
                params.ecommerce,
                params.group
            ],
        )?;
        Ok(())
    }

    pub async fn get_site(&self, idsite: SiteId) -> Result<Option<Site>> {
        let conn = self.conn.lock().await;
        select_site(&conn, idsite)
    }

    pub async fn list_sites(&self, limit: i64, offset: i64) -> Result<(Vec<Site>, i64)> {
        let conn = self.conn.lock().await;

        let total: i64 = conn
            .prepare("SELECT COUNT(*) FROM sites")?
            .query_row([], |row| row.get(0))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {SITE_COLUMNS} FROM sites ORDER BY idsite LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(duckdb::params![limit, offset], site_from_row)?;

        let mut sites = Vec::new();
        for row in rows {
            sites.push(row?);
        }
        Ok((sites, total))
    }

    /// Give `login` view access to `idsite`. Idempotent.
    pub async fn grant_view(&self, login: &str, idsite: SiteId) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO site_access (login, idsite) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
            duckdb::params![login, idsite],
        )?;
        Ok(())
    }
}

#[async_trait]
impl SiteDirectory for DuckDbBackend {
    async fn all_sites(&self) -> Result<Vec<SiteId>> {
        let conn = self.conn.lock().await;
        collect_ids(&conn, "SELECT idsite FROM sites ORDER BY idsite", &[])
    }

    async fn viewable_sites(&self, login: Option<&str>) -> Result<Vec<SiteId>> {
        let login = login.unwrap_or(ANONYMOUS_LOGIN);
        let conn = self.conn.lock().await;
        collect_ids(
            &conn,
            "SELECT s.idsite FROM sites s \
             JOIN site_access a ON a.idsite = s.idsite \
             WHERE a.login = ?1 ORDER BY s.idsite",
            duckdb::params![login],
        )
    }

    async fn site(&self, id: SiteId) -> Result<Option<SiteInfo>> {
        Ok(self.get_site(id).await?.map(SiteInfo::from))
    }
}

#[async_trait]
impl SiteSearch for DuckDbBackend {
    /// Case-insensitive substring match on name or main URL, or an exact id.
    async fn match_pattern(&self, pattern: &str) -> Result<Vec<SiteMatch>> {
        let needle = pattern.trim().to_lowercase();
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT idsite, name FROM sites \
             WHERE contains(lower(name), ?1) \
                OR contains(lower(coalesce(main_url, '')), ?1) \
                OR CAST(idsite AS VARCHAR) = ?1 \
             ORDER BY idsite",
        )?;
        let rows = stmt.query_map(duckdb::params![needle], |row| {
            Ok(SiteMatch {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;

        let mut matches = Vec::new();
        for row in rows {
            matches.push(row?);
        }
        Ok(matches)
    }
}
