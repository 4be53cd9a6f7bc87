/// Schema and session settings, applied with `execute_batch` on every open.
///
/// Every statement is `IF NOT EXISTS`. The memory limit is always explicit
/// because DuckDB otherwise claims 80% of system RAM.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- SITES
-- ===========================================
CREATE SEQUENCE IF NOT EXISTS sites_idsite_seq START 1;
CREATE TABLE IF NOT EXISTS sites (
    idsite          BIGINT PRIMARY KEY,
    name            VARCHAR NOT NULL,
    main_url        VARCHAR,
    ecommerce       BOOLEAN NOT NULL DEFAULT false,
    group_name      VARCHAR,
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- ===========================================
-- SITE ACCESS
-- ===========================================
-- One row per (login, site) view grant. The login 'anonymous' holds the
-- sites visible without logging in.
CREATE TABLE IF NOT EXISTS site_access (
    login           VARCHAR NOT NULL,
    idsite          BIGINT NOT NULL,
    PRIMARY KEY (login, idsite)
);

-- ===========================================
-- NUMERIC ARCHIVES
-- ===========================================
-- One value per (site, period, span, segment, record name). Dates are
-- ISO 'YYYY-MM-DD' strings so range lookups compare lexicographically.
-- segment = '' for unsegmented data.
CREATE TABLE IF NOT EXISTS archive_numeric (
    idsite          BIGINT NOT NULL,
    period          VARCHAR NOT NULL,              -- 'day' | 'week' | 'month' | 'year' | 'range'
    date1           VARCHAR(10) NOT NULL,
    date2           VARCHAR(10) NOT NULL,
    segment         VARCHAR NOT NULL DEFAULT '',
    name            VARCHAR NOT NULL,              -- record name, e.g. 'nb_visits'
    value           DOUBLE NOT NULL,
    PRIMARY KEY (idsite, period, date1, date2, segment, name)
);
CREATE INDEX IF NOT EXISTS idx_archive_numeric_site_period
    ON archive_numeric(idsite, period, date1);

-- ===========================================
-- REPORT SNAPSHOTS (scheduled digest output)
-- ===========================================
CREATE TABLE IF NOT EXISTS report_snapshots (
    id              VARCHAR PRIMARY KEY,           -- UUID v4
    login           VARCHAR,                       -- NULL = anonymous scope
    period          VARCHAR NOT NULL,
    date            VARCHAR NOT NULL,
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    payload         VARCHAR NOT NULL               -- JSON report
);
CREATE INDEX IF NOT EXISTS idx_report_snapshots_created
    ON report_snapshots(created_at DESC);
"#
    )
}
