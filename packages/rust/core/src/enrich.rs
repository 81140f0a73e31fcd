//! Fill a record's remote fields from the detail and credits lookups.

use reelfill_shared::{MovieRecord, ReelfillError};
use reelfill_tmdb::RemoteSource;

/// Which of the two remote lookups failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Detail,
    Credits,
}

impl std::fmt::Display for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Detail => f.write_str("detail"),
            Self::Credits => f.write_str("credits"),
        }
    }
}

/// All lookup failures for one remote id.
#[derive(Debug)]
pub struct RemoteError {
    pub remote_id: String,
    pub failures: Vec<(Lookup, ReelfillError)>,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:", self.remote_id)?;
        for (i, (lookup, err)) in self.failures.iter().enumerate() {
            let sep = if i == 0 { " " } else { "; " };
            write!(f, "{sep}{lookup}: {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RemoteError {}

/// Run both lookups for `remote_id` and write their results into `record`.
///
/// The two lookups run concurrently and neither short-circuits the other.
/// Whatever succeeded is applied even when the other failed, so the record
/// may be half-filled when this returns `Err`.
pub async fn enrich_record<S: RemoteSource>(
    source: &S,
    remote_id: &str,
    record: &mut MovieRecord,
) -> Result<(), RemoteError> {
    let (detail, credits) = tokio::join!(
        source.movie_detail(remote_id),
        source.movie_credits(remote_id),
    );

    let mut failures = Vec::new();

    match detail {
        Ok(detail) => {
            record.title = detail.title;
            record.introduction = detail.overview;
            record.language = detail.language;
            record.release_date = detail.release_date;
            record.pic_url = detail.poster_url;
        }
        Err(e) => failures.push((Lookup::Detail, e)),
    }

    match credits {
        Ok(cast) => record.participants = cast,
        Err(e) => failures.push((Lookup::Credits, e)),
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(RemoteError {
            remote_id: remote_id.to_string(),
            failures,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use reelfill_shared::{LocalId, Participant, RatingStats, Result};
    use reelfill_tmdb::MovieDetail;

    /// Scripted remote source for pipeline tests.
    #[derive(Clone, Default)]
    pub(crate) struct FakeSource {
        pub fail_detail: HashSet<String>,
        pub fail_credits: HashSet<String>,
        pub calls: Arc<AtomicUsize>,
    }

    impl FakeSource {
        pub fn failing(detail: &[&str], credits: &[&str]) -> Self {
            Self {
                fail_detail: detail.iter().map(|s| s.to_string()).collect(),
                fail_credits: credits.iter().map(|s| s.to_string()).collect(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RemoteSource for FakeSource {
        async fn movie_detail(&self, remote_id: &str) -> Result<MovieDetail> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail_detail.contains(remote_id) {
                return Err(ReelfillError::Network(format!("movie/{remote_id}: HTTP 500")));
            }
            Ok(MovieDetail {
                title: format!("Title {remote_id}"),
                overview: format!("Overview {remote_id}"),
                language: "en".into(),
                release_date: "1995-10-30".into(),
                poster_url: format!("https://img.example.com/{remote_id}.jpg"),
            })
        }

        async fn movie_credits(&self, remote_id: &str) -> Result<Vec<Participant>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail_credits.contains(remote_id) {
                return Err(ReelfillError::decode(
                    format!("movie/{remote_id}/credits"),
                    "expected value at line 1 column 1",
                ));
            }
            Ok(vec![Participant {
                character: "Lead".into(),
                name: format!("Actor {remote_id}"),
            }])
        }
    }

    fn blank(id: &str) -> MovieRecord {
        MovieRecord::with_stats(LocalId::parse(id).unwrap(), RatingStats::default())
    }

    #[tokio::test]
    async fn fills_all_fields_on_success() {
        let source = FakeSource::default();
        let mut record = blank("1");

        enrich_record(&source, "862", &mut record).await.expect("enrich");

        assert_eq!(record.title, "Title 862");
        assert_eq!(record.introduction, "Overview 862");
        assert_eq!(record.pic_url, "https://img.example.com/862.jpg");
        assert_eq!(record.participants.len(), 1);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn credits_still_applied_when_detail_fails() {
        let source = FakeSource::failing(&["862"], &[]);
        let mut record = blank("1");

        let err = enrich_record(&source, "862", &mut record).await.unwrap_err();

        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].0, Lookup::Detail);
        assert!(record.title.is_empty());
        assert_eq!(record.participants[0].name, "Actor 862");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn both_failures_reported_together() {
        let source = FakeSource::failing(&["9"], &["9"]);
        let mut record = blank("1");

        let err = enrich_record(&source, "9", &mut record).await.unwrap_err();

        assert_eq!(err.failures.len(), 2);
        let text = err.to_string();
        assert!(text.starts_with("9: detail: network error"));
        assert!(text.contains("; credits: decode error"));
    }
}
