//! libSQL storage layer for enriched movie documents.
//!
//! The [`Storage`] struct wraps a local libSQL database that receives the
//! complete record set at the end of an enrichment run, plus a history of
//! runs and their summary stats.
//!
//! **Access rules:**
//! - the enrichment pipeline writes via [`Storage::open`]
//! - inspection tools read via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use reelfill_shared::{LocalId, MovieRecord, Participant, ReelfillError, Result};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    // Never read, but must outlive `conn`.
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ReelfillError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ReelfillError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ReelfillError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ReelfillError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ReelfillError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ReelfillError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ReelfillError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Movie operations
    // -----------------------------------------------------------------------

    /// Write a batch of records in one transaction.
    ///
    /// Records are upserted by local id, so handing the same set over again
    /// after a resumed run leaves a single row per movie.
    pub async fn upsert_movies(&self, records: &[MovieRecord]) -> Result<usize> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();

        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| ReelfillError::Storage(e.to_string()))?;

        for record in records {
            let participants = serde_json::to_string(&record.participants)
                .map_err(|e| ReelfillError::encode("participants", e))?;

            tx.execute(
                "INSERT INTO movies (id, title, pic_url, introduction, participants_json,
                                     release_date, language, unique_rating_cnt, average_rating, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                   title = excluded.title,
                   pic_url = excluded.pic_url,
                   introduction = excluded.introduction,
                   participants_json = excluded.participants_json,
                   release_date = excluded.release_date,
                   language = excluded.language,
                   unique_rating_cnt = excluded.unique_rating_cnt,
                   average_rating = excluded.average_rating,
                   stored_at = excluded.stored_at",
                params![
                    record.movie_id.as_str(),
                    record.title.as_str(),
                    record.pic_url.as_str(),
                    record.introduction.as_str(),
                    participants,
                    record.release_date.as_str(),
                    record.language.as_str(),
                    record.unique_rating_cnt as i64,
                    record.average_rating,
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| {
                ReelfillError::Storage(format!("insert movie {}: {e}", record.movie_id))
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| ReelfillError::Storage(e.to_string()))?;

        tracing::info!(count = records.len(), "movies written to store");
        Ok(records.len())
    }

    /// Get a movie by local id.
    pub async fn get_movie(&self, id: &LocalId) -> Result<Option<MovieRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, pic_url, introduction, participants_json,
                        release_date, language, unique_rating_cnt, average_rating
                 FROM movies WHERE id = ?1",
                params![id.as_str()],
            )
            .await
            .map_err(|e| ReelfillError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_movie(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(ReelfillError::Storage(e.to_string())),
        }
    }

    /// Count stored movies.
    pub async fn count_movies(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM movies", params![])
            .await
            .map_err(|e| ReelfillError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row
                .get::<i64>(0)
                .map_err(|e| ReelfillError::Storage(e.to_string()))? as u64),
            Ok(None) => Ok(0),
            Err(e) => Err(ReelfillError::Storage(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Run history
    // -----------------------------------------------------------------------

    /// Record an enrichment run that began at `started_at`.
    pub async fn insert_run(&self, run_id: &str, started_at: DateTime<Utc>) -> Result<()> {
        self.check_writable()?;
        let started_at = started_at.to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO enrichment_runs (id, started_at) VALUES (?1, ?2)",
                params![run_id, started_at.as_str()],
            )
            .await
            .map_err(|e| ReelfillError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Mark a run finished with its summary stats.
    pub async fn finish_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE enrichment_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(|e| ReelfillError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get the stats JSON of a finished run.
    pub async fn get_run_stats(&self, run_id: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT stats_json FROM enrichment_runs WHERE id = ?1",
                params![run_id],
            )
            .await
            .map_err(|e| ReelfillError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<String>(0).ok()),
            Ok(None) => Ok(None),
            Err(e) => Err(ReelfillError::Storage(e.to_string())),
        }
    }
}

/// Convert a database row to a [`MovieRecord`].
fn row_to_movie(row: &libsql::Row) -> Result<MovieRecord> {
    let text = |idx: i32| -> Result<String> {
        row.get::<String>(idx)
            .map_err(|e| ReelfillError::Storage(e.to_string()))
    };

    let participants: Vec<Participant> = serde_json::from_str(&text(4)?)
        .map_err(|e| ReelfillError::decode("participants_json", e))?;

    Ok(MovieRecord {
        movie_id: LocalId::parse(&text(0)?)?,
        title: text(1)?,
        pic_url: text(2)?,
        introduction: text(3)?,
        participants,
        release_date: text(5)?,
        language: text(6)?,
        unique_rating_cnt: row
            .get::<i64>(7)
            .map_err(|e| ReelfillError::Storage(e.to_string()))? as u64,
        average_rating: row
            .get::<f64>(8)
            .map_err(|e| ReelfillError::Storage(e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelfill_shared::RatingStats;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("reelfill_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn movie(id: &str, title: &str) -> MovieRecord {
        let mut record = MovieRecord::with_stats(
            LocalId::parse(id).unwrap(),
            RatingStats {
                count: 4,
                total: 14.0,
            },
        );
        record.title = title.into();
        record.language = "en".into();
        record.participants = vec![Participant {
            character: "Woody".into(),
            name: "Tom Hanks".into(),
        }];
        record
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("reelfill_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn movie_upsert_and_query() {
        let storage = test_storage().await;

        let written = storage
            .upsert_movies(&[movie("1", "Toy Story"), movie("2", "Jumanji")])
            .await
            .expect("upsert");
        assert_eq!(written, 2);

        let found = storage
            .get_movie(&LocalId::parse("1").unwrap())
            .await
            .expect("get movie")
            .expect("movie present");
        assert_eq!(found, movie("1", "Toy Story"));

        let missing = storage
            .get_movie(&LocalId::parse("99").unwrap())
            .await
            .expect("get missing");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn repeated_batches_do_not_duplicate() {
        let storage = test_storage().await;

        storage.upsert_movies(&[movie("1", "Old")]).await.unwrap();
        storage
            .upsert_movies(&[movie("1", "New"), movie("2", "Other")])
            .await
            .unwrap();

        assert_eq!(storage.count_movies().await.unwrap(), 2);
        let found = storage
            .get_movie(&LocalId::parse("1").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.title, "New");
    }

    #[tokio::test]
    async fn run_lifecycle() {
        let storage = test_storage().await;
        let run_id = Uuid::now_v7().to_string();

        storage.insert_run(&run_id, Utc::now()).await.expect("insert run");
        storage
            .finish_run(&run_id, r#"{"enriched": 10}"#)
            .await
            .expect("finish run");

        let stats = storage.get_run_stats(&run_id).await.unwrap();
        assert!(stats.unwrap().contains("enriched"));
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("reelfill_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.upsert_movies(&[movie("1", "Toy Story")]).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.count_movies().await.unwrap(), 1);
        let result = ro.upsert_movies(&[movie("2", "Jumanji")]).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
