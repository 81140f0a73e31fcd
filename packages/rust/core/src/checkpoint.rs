//! Durable whole-file snapshot of enriched records.
//!
//! A checkpoint is a single JSON array of [`MovieRecord`]s. Every save
//! rewrites the full accumulated set: the bytes go to a sibling temp file,
//! the on-disk length is checked against the encoded length, and the temp
//! file is renamed over the target. Saves on one store are serialized.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use reelfill_shared::{MovieRecord, ReelfillError, Result};

/// Load/save access to one checkpoint file.
pub struct CheckpointStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all records. A missing (or empty) file is an empty checkpoint.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<Vec<MovieRecord>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no checkpoint found, starting fresh");
                return Ok(Vec::new());
            }
            Err(e) => return Err(ReelfillError::io(&self.path, e)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            debug!("checkpoint file is empty");
            return Ok(Vec::new());
        }

        let records: Vec<MovieRecord> = serde_json::from_slice(&bytes)
            .map_err(|e| ReelfillError::decode(self.path.display().to_string(), e))?;

        info!(records = records.len(), "checkpoint loaded");
        Ok(records)
    }

    /// Overwrite the checkpoint with `records`.
    ///
    /// Concurrent callers queue on an internal lock; the last one to acquire
    /// it wins.
    pub async fn save(&self, records: &[MovieRecord]) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let bytes = serde_json::to_vec(records)
            .map_err(|e| ReelfillError::encode(self.path.display().to_string(), e))?;

        write_snapshot(&self.path, &bytes).await?;
        debug!(records = records.len(), bytes = bytes.len(), "checkpoint saved");
        Ok(())
    }
}

/// Replace `path` with `bytes` via a temp file and rename.
pub(crate) async fn write_snapshot(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ReelfillError::io(parent, e))?;
        }
    }

    let tmp = temp_path(path);
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| ReelfillError::io(&tmp, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| ReelfillError::io(&tmp, e))?;
    file.sync_all()
        .await
        .map_err(|e| ReelfillError::io(&tmp, e))?;
    let written = file
        .metadata()
        .await
        .map_err(|e| ReelfillError::io(&tmp, e))?
        .len();
    drop(file);

    if let Err(e) = check_length(&tmp, bytes.len() as u64, written) {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| ReelfillError::io(path, e))
}

fn check_length(path: &Path, expected: u64, written: u64) -> Result<()> {
    if expected != written {
        return Err(ReelfillError::ShortWrite {
            path: path.to_path_buf(),
            expected,
            written,
        });
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
