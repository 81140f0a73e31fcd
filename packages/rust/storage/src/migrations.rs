//! SQL migration definitions for the reelfill database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: movies, enrichment_runs",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Enriched movie documents, keyed by local catalog id
CREATE TABLE IF NOT EXISTS movies (
    id                TEXT PRIMARY KEY,
    title             TEXT NOT NULL,
    pic_url           TEXT NOT NULL,
    introduction      TEXT NOT NULL,
    participants_json TEXT NOT NULL,
    release_date      TEXT NOT NULL,
    language          TEXT NOT NULL,
    unique_rating_cnt INTEGER NOT NULL,
    average_rating    REAL NOT NULL,
    stored_at         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_movies_language ON movies(language);

-- Enrichment run history
CREATE TABLE IF NOT EXISTS enrichment_runs (
    id          TEXT PRIMARY KEY,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
    ]
}
