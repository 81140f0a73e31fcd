//! Persisted list of local ids that have no remote counterpart.
//!
//! The file is a JSON array written once per run and fully overwritten; it is
//! never merged with the previous run's content. Operators archive or clear
//! it between runs.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use reelfill_shared::{LocalId, ReelfillError, Result};

use crate::checkpoint::write_snapshot;

/// Writer for the missing-id list.
pub struct MissingIdSink {
    path: PathBuf,
}

impl MissingIdSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the file with `ids`.
    pub async fn save(&self, ids: &[LocalId]) -> Result<()> {
        if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            warn!(path = %self.path.display(), "overwriting missing-id list from a previous run");
        }

        let bytes = serde_json::to_vec(ids)
            .map_err(|e| ReelfillError::encode(self.path.display().to_string(), e))?;
        write_snapshot(&self.path, &bytes).await?;

        info!(count = ids.len(), path = %self.path.display(), "missing-id list saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_file() -> PathBuf {
        std::env::temp_dir()
            .join(format!("reelfill-missing-test-{}", Uuid::now_v7()))
            .join("missing.json")
    }

    #[tokio::test]
    async fn writes_json_array_of_ids() {
        let sink = MissingIdSink::new(temp_file());
        let ids = vec![LocalId::parse("2").unwrap(), LocalId::parse("9").unwrap()];

        sink.save(&ids).await.expect("save");

        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content, r#"["2","9"]"#);
    }

    #[tokio::test]
    async fn second_save_replaces_first() {
        let sink = MissingIdSink::new(temp_file());
        sink.save(&[LocalId::parse("1").unwrap(), LocalId::parse("2").unwrap()])
            .await
            .unwrap();
        sink.save(&[]).await.unwrap();

        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content, "[]");
    }
}
