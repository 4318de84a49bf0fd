//! Checkpoint module for persisting batch resume state.
//!
//! The checkpoint records how far a batch got so an interrupted run can pick
//! up where it stopped. It is stored as a single JSON file and replaced
//! atomically on every save: the new contents go to a temporary file in the
//! same directory, which is synced and then renamed over the old one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use uuid::Uuid;

/// Current on-disk format version.
pub const CHECKPOINT_VERSION: u32 = 1;

fn default_version() -> u32 {
    CHECKPOINT_VERSION
}

/// Persisted resume state for one batch.
///
/// Items whose absolute position is below `current_index` have been handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCheckpoint {
    /// Format version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Offset into the sorted listing of the next unhandled item.
    pub current_index: usize,
    /// Listing size when the checkpoint was established.
    pub total_files: usize,
    /// Batch folder that wrote this checkpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<PathBuf>,
    /// Run that last wrote this checkpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    /// Time of the last write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for BatchCheckpoint {
    fn default() -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            current_index: 0,
            total_files: 0,
            folder: None,
            run_id: None,
            updated_at: None,
        }
    }
}

impl BatchCheckpoint {
    /// Create a checkpoint at `current_index` of `total_files`.
    pub fn new(current_index: usize, total_files: usize) -> Self {
        Self {
            current_index,
            total_files,
            ..Self::default()
        }
    }

    /// True when `0 <= current_index <= total_files`.
    pub fn is_consistent(&self) -> bool {
        self.current_index <= self.total_files
    }

    /// True when the checkpoint points into an unfinished batch.
    pub fn is_resumable(&self) -> bool {
        self.total_files > 0 && self.current_index < self.total_files
    }

    /// Record that the item at absolute position `index` was handled.
    pub fn advance_past(&mut self, index: usize, total_files: usize) {
        self.current_index = index + 1;
        self.total_files = total_files.max(self.current_index);
        self.updated_at = Some(Utc::now());
    }
}

/// Reason a checkpoint file could not be used.
#[derive(Debug, thiserror::Error)]
enum CheckpointDecodeError {
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
    #[error("malformed contents: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported version {0}")]
    Version(u32),
    #[error("current_index {current_index} exceeds total_files {total_files}")]
    Inconsistent {
        current_index: usize,
        total_files: usize,
    },
}

/// Sole reader and writer of the checkpoint file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Create a store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the checkpoint file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the checkpoint.
    ///
    /// Never fails: a missing file, an unreadable file and a file that does
    /// not decode into a consistent checkpoint all yield the default `{0, 0}`.
    pub fn load(&self) -> BatchCheckpoint {
        match self.try_load() {
            Ok(Some(checkpoint)) => {
                debug!(
                    path = %self.path.display(),
                    current_index = checkpoint.current_index,
                    total_files = checkpoint.total_files,
                    "loaded checkpoint"
                );
                checkpoint
            }
            Ok(None) => {
                debug!(path = %self.path.display(), "no checkpoint, starting fresh");
                BatchCheckpoint::default()
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "ignoring unusable checkpoint, starting fresh"
                );
                BatchCheckpoint::default()
            }
        }
    }

    fn try_load(&self) -> Result<Option<BatchCheckpoint>, CheckpointDecodeError> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let checkpoint: BatchCheckpoint = serde_json::from_slice(&content)?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(CheckpointDecodeError::Version(checkpoint.version));
        }
        if !checkpoint.is_consistent() {
            return Err(CheckpointDecodeError::Inconsistent {
                current_index: checkpoint.current_index,
                total_files: checkpoint.total_files,
            });
        }
        Ok(Some(checkpoint))
    }

    /// Saves the checkpoint, replacing the previous file atomically.
    pub fn save(&self, checkpoint: &BatchCheckpoint) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let json = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        sync_dir(&dir);
        Ok(())
    }
}

/// Flush the directory entry so the rename itself survives power loss.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn store_in(temp_dir: &TempDir) -> CheckpointStore {
        CheckpointStore::new(temp_dir.path().join("compression_resume.json"))
    }

    #[test]
    fn test_load_missing_file_yields_default() {
        let temp_dir = TempDir::new().unwrap();
        let checkpoint = store_in(&temp_dir).load();
        assert_eq!(checkpoint, BatchCheckpoint::default());
        assert_eq!(checkpoint.current_index, 0);
        assert_eq!(checkpoint.total_files, 0);
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);

        let mut checkpoint = BatchCheckpoint::new(0, 5);
        checkpoint.folder = Some(PathBuf::from("/videos"));
        checkpoint.run_id = Some(Uuid::new_v4());
        checkpoint.advance_past(2, 5);

        store.save(&checkpoint).expect("save should succeed");
        let loaded = store.load();

        assert_eq!(loaded, checkpoint);
        assert_eq!(loaded.current_index, 3);
        assert_eq!(loaded.total_files, 5);
    }

    #[test]
    fn test_save_overwrites_and_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);

        for index in 0..4 {
            let mut checkpoint = BatchCheckpoint::new(0, 4);
            checkpoint.advance_past(index, 4);
            store.save(&checkpoint).unwrap();
        }

        assert_eq!(store.load().current_index, 4);
        let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "only the checkpoint file should remain");
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp_dir.path().join("nested/state/resume.json"));

        store.save(&BatchCheckpoint::new(1, 2)).unwrap();
        assert!(store.path().exists());
        assert_eq!(store.load().current_index, 1);
    }

    #[test]
    fn test_truncated_file_yields_default() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        fs::write(store.path(), br#"{"version":1,"current_index":3,"tot"#).unwrap();

        assert_eq!(store.load(), BatchCheckpoint::default());
    }

    #[test]
    fn test_inconsistent_checkpoint_yields_default() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        fs::write(
            store.path(),
            br#"{"version":1,"current_index":7,"total_files":2}"#,
        )
        .unwrap();

        assert_eq!(store.load(), BatchCheckpoint::default());
    }

    #[test]
    fn test_unknown_version_yields_default() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        fs::write(
            store.path(),
            br#"{"version":99,"current_index":1,"total_files":2}"#,
        )
        .unwrap();

        assert_eq!(store.load(), BatchCheckpoint::default());
    }

    #[test]
    fn test_minimal_file_without_optional_fields() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        fs::write(store.path(), br#"{"current_index":1,"total_files":2}"#).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.current_index, 1);
        assert_eq!(loaded.total_files, 2);
        assert!(loaded.folder.is_none());
        assert!(loaded.is_resumable());
    }

    #[test]
    fn test_resumable() {
        assert!(!BatchCheckpoint::default().is_resumable());
        assert!(BatchCheckpoint::new(0, 3).is_resumable());
        assert!(BatchCheckpoint::new(2, 3).is_resumable());
        assert!(!BatchCheckpoint::new(3, 3).is_resumable());
    }

    #[test]
    fn test_advance_past_keeps_index_within_total() {
        let mut checkpoint = BatchCheckpoint::new(0, 2);
        checkpoint.advance_past(4, 2);
        assert_eq!(checkpoint.current_index, 5);
        assert!(checkpoint.is_consistent());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // Whatever bytes are on disk, load returns a consistent checkpoint.
        #[test]
        fn prop_load_tolerates_arbitrary_contents(
            content in prop::collection::vec(any::<u8>(), 0..256),
        ) {
            let temp_dir = TempDir::new().unwrap();
            let store = store_in(&temp_dir);
            fs::write(store.path(), &content).unwrap();

            let loaded = store.load();
            prop_assert!(loaded.is_consistent());
        }

        #[test]
        fn prop_load_tolerates_any_index_pair(
            current_index in 0usize..1000,
            total_files in 0usize..1000,
        ) {
            let temp_dir = TempDir::new().unwrap();
            let store = store_in(&temp_dir);
            let json = format!(
                r#"{{"version":1,"current_index":{},"total_files":{}}}"#,
                current_index, total_files
            );
            fs::write(store.path(), json).unwrap();

            let loaded = store.load();
            prop_assert!(loaded.is_consistent());
            if current_index <= total_files {
                prop_assert_eq!(loaded.current_index, current_index);
                prop_assert_eq!(loaded.total_files, total_files);
            } else {
                prop_assert_eq!(loaded, BatchCheckpoint::default());
            }
        }
    }
}
