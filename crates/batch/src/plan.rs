//! Planner module for building the ordered worklist of a batch.
//!
//! Lists the batch folder (immediate entries only), keeps files with the
//! input extension, sorts them by file name and applies the checkpoint's
//! resume offset. Whether an item is already done is decided later, at run
//! time, by [`WorkItem::is_done`].

use crate::checkpoint::BatchCheckpoint;
use crate::config::BatchConfig;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Errors that prevent a batch from being planned.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Folder is missing or cannot be inspected.
    #[error("cannot read folder {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Path exists but is not a directory.
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    /// Listing the folder failed part way.
    #[error("failed to list folder: {0}")]
    Walk(#[from] walkdir::Error),
}

/// One input file paired with its output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Position in the full sorted listing.
    pub index: usize,
    /// The original file.
    pub source_path: PathBuf,
    /// Where the encoded file goes.
    pub output_path: PathBuf,
}

impl WorkItem {
    /// The existence check: the item counts as done once its output exists.
    pub fn is_done(&self) -> bool {
        self.output_path.exists()
    }
}

/// Result of planning a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Items still to handle, in listing order.
    pub items: Vec<WorkItem>,
    /// Size of the full sorted listing.
    pub listing_len: usize,
    /// Absolute position of the first item.
    pub start_index: usize,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// Output path for `source`: same directory, `<stem><suffix>.<ext>`.
///
/// For example `/videos/a.mp4` -> `/videos/a_compressed.mp4`
pub fn output_path_for(source: &Path, suffix: &str) -> PathBuf {
    let mut name = source
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    if let Some(ext) = source.extension() {
        name.push(".");
        name.push(ext);
    }
    source.with_file_name(name)
}

/// Builds worklists from a folder and a checkpoint.
#[derive(Debug, Clone)]
pub struct BatchPlanner {
    extension: String,
    output_suffix: String,
}

impl BatchPlanner {
    /// Create a planner for files ending in `.extension` (case-insensitive).
    pub fn new(extension: &str, output_suffix: &str) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_lowercase(),
            output_suffix: output_suffix.to_string(),
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(&config.extension, &config.output_suffix)
    }

    /// Checks if a path has the input extension (case-insensitive).
    pub fn is_input_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase() == self.extension)
            .unwrap_or(false)
    }

    /// Checks if a path is one of our own outputs.
    pub fn is_output_file(&self, path: &Path) -> bool {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().ends_with(&self.output_suffix))
            .unwrap_or(false)
    }

    /// Output path for a source file.
    pub fn output_path(&self, source: &Path) -> PathBuf {
        output_path_for(source, &self.output_suffix)
    }

    /// Lists the input files of `folder`, sorted by file name.
    ///
    /// Subdirectories are not descended into and previously produced outputs
    /// are left out, so the listing stays the same across runs.
    pub fn list(&self, folder: &Path) -> Result<Vec<PathBuf>, PlanError> {
        let metadata = fs::metadata(folder).map_err(|source| PlanError::Io {
            path: folder.to_path_buf(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(PlanError::NotADirectory(folder.to_path_buf()));
        }

        let walker = WalkDir::new(folder)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()));

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry?;
            let path = entry.path();

            if !entry.file_type().is_file() {
                continue;
            }
            if !self.is_input_file(path) {
                continue;
            }
            if self.is_output_file(path) {
                debug!(
                    path = %path.display(),
                    suffix = %self.output_suffix,
                    "name ends with the output suffix, leaving it out"
                );
                continue;
            }
            files.push(path.to_path_buf());
        }

        Ok(files)
    }

    /// Builds the worklist for `folder`.
    ///
    /// A resumable checkpoint drops the first `current_index` entries of the
    /// full listing. This assumes the listing did not change since the
    /// checkpoint was written.
    pub fn plan(&self, folder: &Path, checkpoint: &BatchCheckpoint) -> Result<Plan, PlanError> {
        let listing = self.list(folder)?;
        let listing_len = listing.len();

        let start_index = if checkpoint.is_resumable() {
            checkpoint.current_index.min(listing_len)
        } else {
            0
        };

        debug!(
            folder = %folder.display(),
            listing_len,
            start_index,
            "planned batch"
        );

        let items = listing
            .into_iter()
            .enumerate()
            .skip(start_index)
            .map(|(index, source_path)| WorkItem {
                index,
                output_path: self.output_path(&source_path),
                source_path,
            })
            .collect();

        Ok(Plan {
            items,
            listing_len,
            start_index,
        })
    }
}

/// Display name for an item in console output.
pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or(path.as_os_str())
        .to_string_lossy()
        .into_owned()
}
