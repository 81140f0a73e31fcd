//! Set of local ids already present in a loaded checkpoint.

use std::collections::HashSet;

use reelfill_shared::{LocalId, MovieRecord, ReelfillError, Result};

/// Collect the ids of already-enriched records.
///
/// Fails on the first repeated id: a checkpoint with duplicates was written
/// by a broken run and must not be extended.
pub fn build_resume_set(records: &[MovieRecord]) -> Result<HashSet<LocalId>> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.movie_id.clone()) {
            return Err(ReelfillError::DuplicateId {
                local_id: record.movie_id.to_string(),
            });
        }
    }
    Ok(seen)
}
