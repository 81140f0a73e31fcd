//! Core domain types for reelfill enrichment runs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ReelfillError, Result};

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one enrichment run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// LocalId
// ---------------------------------------------------------------------------

/// Identifier of a catalog entity in the local data set (the `movieId` column).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(String);

impl LocalId {
    /// Parse a local id, trimming whitespace. Empty ids are rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ReelfillError::input("empty local id"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LocalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for LocalId {
    type Err = ReelfillError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// MovieRecord
// ---------------------------------------------------------------------------

/// One cast member as returned by the credits lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub character: String,
    pub name: String,
}

/// The enrichable entity persisted in the checkpoint and the downstream store.
///
/// Rating aggregates are filled in locally when the record is built; every
/// other field comes from the remote detail and credits lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieRecord {
    /// Local catalog id. Unique within a checkpoint.
    #[serde(rename = "movieID")]
    pub movie_id: LocalId,
    pub title: String,
    pub pic_url: String,
    pub introduction: String,
    #[serde(default)]
    pub participants: Vec<Participant>,
    pub release_date: String,
    pub language: String,
    pub unique_rating_cnt: u64,
    pub average_rating: f64,
}

impl MovieRecord {
    /// Build a record carrying only the precomputed rating aggregates.
    pub fn with_stats(movie_id: LocalId, stats: RatingStats) -> Self {
        Self {
            movie_id,
            title: String::new(),
            pic_url: String::new(),
            introduction: String::new(),
            participants: Vec::new(),
            release_date: String::new(),
            language: String::new(),
            unique_rating_cnt: stats.count,
            average_rating: stats.average(),
        }
    }
}

// ---------------------------------------------------------------------------
// RatingStats
// ---------------------------------------------------------------------------

/// Per-movie rating aggregate computed from the local ratings table.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RatingStats {
    /// Number of ratings.
    pub count: u64,
    /// Sum of all rating values.
    pub total: f64,
}

impl RatingStats {
    /// Fold one more rating into the aggregate.
    pub fn add(&mut self, rating: f64) {
        self.count += 1;
        self.total += rating;
    }

    /// Mean rating rounded to two decimals; zero when there are no ratings.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        round2(self.total / self.count as f64)
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Input rows and work items
// ---------------------------------------------------------------------------

/// One row of the links table: local id plus (possibly empty) remote id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRow {
    pub local_id: LocalId,
    /// Remote (TMDB) id; empty when the entity has no remote counterpart.
    pub remote_id: String,
}

/// A unit of work handed to exactly one worker.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub local_id: LocalId,
    pub remote_id: String,
    /// Exclusively owned by the worker processing this item.
    pub record: MovieRecord,
}

impl WorkItem {
    /// Wrap `record`; the item's local id is taken from the record.
    pub fn new(remote_id: impl Into<String>, record: MovieRecord) -> Self {
        Self {
            local_id: record.movie_id.clone(),
            remote_id: remote_id.into(),
            record,
        }
    }
}

/// A per-item enrichment failure, kept until the end-of-run report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub local_id: LocalId,
    pub remote_id: String,
    pub cause: String,
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.local_id, self.remote_id, self.cause)
    }
}
