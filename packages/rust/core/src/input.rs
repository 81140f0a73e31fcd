//! Tabular input: the links table and the ratings table.
//!
//! Both files are CSV with a header row, which is always skipped.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::{ByteRecord, ReaderBuilder, StringRecord, StringRecordsIntoIter};
use tracing::{info, instrument};

use reelfill_shared::{LinkRow, LocalId, RatingStats, ReelfillError, Result};

/// Column of `movieId` in the links table.
const LINK_LOCAL_COL: usize = 0;
/// Column of `tmdbId` in the links table.
const LINK_REMOTE_COL: usize = 2;
/// Column of `movieId` in the ratings table.
const RATING_MOVIE_COL: usize = 1;
/// Column of `rating` in the ratings table.
const RATING_VALUE_COL: usize = 2;

/// Lazy reader over the links table. Reopen the file to restart.
pub struct LinkReader {
    path: PathBuf,
    records: StringRecordsIntoIter<BufReader<File>>,
}

/// Open the links table (`movieId,imdbId,tmdbId`).
pub fn read_links(path: &Path) -> Result<LinkReader> {
    let file = File::open(path).map_err(|e| ReelfillError::io(path, e))?;
    let reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    Ok(LinkReader {
        path: path.to_path_buf(),
        records: reader.into_records(),
    })
}

impl Iterator for LinkReader {
    type Item = Result<LinkRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        Some(
            record
                .map_err(|e| {
                    ReelfillError::input(format!("{}: {e}", self.path.display()))
                })
                .and_then(|rec| parse_link(&self.path, &rec)),
        )
    }
}

fn parse_link(path: &Path, rec: &StringRecord) -> Result<LinkRow> {
    let line = rec.position().map(|p| p.line()).unwrap_or(0);

    let (Some(local), Some(remote)) = (rec.get(LINK_LOCAL_COL), rec.get(LINK_REMOTE_COL)) else {
        return Err(ReelfillError::input(format!(
            "{}:{line}: expected at least 3 columns, found {}",
            path.display(),
            rec.len()
        )));
    };

    let local_id = LocalId::parse(local)
        .map_err(|e| ReelfillError::input(format!("{}:{line}: {e}", path.display())))?;

    Ok(LinkRow {
        local_id,
        remote_id: remote.trim().to_string(),
    })
}

/// Aggregate the ratings table (`userId,movieId,rating,...`) per movie.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_rating_stats(path: &Path) -> Result<HashMap<LocalId, RatingStats>> {
    let file = File::open(path).map_err(|e| ReelfillError::io(path, e))?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::with_capacity(8 << 20, file));

    let mut stats: HashMap<LocalId, RatingStats> = HashMap::new();
    let mut rec = ByteRecord::new();
    let mut rows = 0u64;

    loop {
        let more = reader
            .read_byte_record(&mut rec)
            .map_err(|e| ReelfillError::input(format!("{}: {e}", path.display())))?;
        if !more {
            break;
        }
        rows += 1;

        let line = rec.position().map(|p| p.line()).unwrap_or(0);
        let movie_id = LocalId::parse(byte_field(&rec, RATING_MOVIE_COL, path, line)?)
            .map_err(|e| ReelfillError::input(format!("{}:{line}: {e}", path.display())))?;
        let value_str = byte_field(&rec, RATING_VALUE_COL, path, line)?;
        let value: f64 = value_str.trim().parse().map_err(|e| {
            ReelfillError::input(format!(
                "{}:{line}: invalid rating '{value_str}': {e}",
                path.display()
            ))
        })?;

        stats.entry(movie_id).or_default().add(value);
    }

    info!(rows, movies = stats.len(), "rating stats computed");
    Ok(stats)
}

fn byte_field<'a>(rec: &'a ByteRecord, idx: usize, path: &Path, line: u64) -> Result<&'a str> {
    let raw = rec.get(idx).ok_or_else(|| {
        ReelfillError::input(format!("{}:{line}: missing column {idx}", path.display()))
    })?;
    std::str::from_utf8(raw)
        .map_err(|e| ReelfillError::input(format!("{}:{line}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn write_temp(name: &str, content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("reelfill-input-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn links_skip_header_and_keep_empty_remote_ids() {
        let path = write_temp(
            "links.csv",
            "movieId,imdbId,tmdbId\n1,0114709,862\n2,0113497,\n3,0113228, 15602 \n",
        );

        let rows: Vec<LinkRow> = read_links(&path)
            .unwrap()
            .collect::<Result<_>>()
            .expect("parse links");

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].local_id.as_str(), "1");
        assert_eq!(rows[0].remote_id, "862");
        assert_eq!(rows[1].remote_id, "");
        assert_eq!(rows[2].remote_id, "15602");
    }

    #[test]
    fn short_link_row_is_input_error() {
        let path = write_temp("links.csv", "movieId,imdbId,tmdbId\n1,0114709\n");

        let first = read_links(&path).unwrap().next().expect("one row");
        assert!(matches!(first, Err(ReelfillError::Input { .. })));
    }

    #[test]
    fn missing_links_file_is_io_error() {
        let path = std::env::temp_dir().join(format!("reelfill-nope-{}.csv", Uuid::now_v7()));
        assert!(matches!(read_links(&path), Err(ReelfillError::Io { .. })));
    }

    #[test]
    fn rating_stats_accumulate_per_movie() {
        let path = write_temp(
            "ratings.csv",
            "userId,movieId,rating,timestamp\n\
             1,1,4.0,964982703\n\
             2,1,3.5,964981247\n\
             1,3,5.0,964982224\n",
        );

        let stats = read_rating_stats(&path).expect("ratings");

        let one = stats[&LocalId::parse("1").unwrap()];
        assert_eq!(one.count, 2);
        assert_eq!(one.total, 7.5);
        assert_eq!(one.average(), 3.75);
        assert_eq!(stats[&LocalId::parse("3").unwrap()].count, 1);
        assert!(!stats.contains_key(&LocalId::parse("2").unwrap()));
    }

    #[test]
    fn bad_rating_value_is_input_error() {
        let path = write_temp("ratings.csv", "userId,movieId,rating\n1,1,five\n");
        let err = read_rating_stats(&path).unwrap_err();
        assert!(err.to_string().contains("invalid rating 'five'"));
    }
}
