//! Statistics module for vidshrink
//!
//! Accumulates per-run counters and renders the final report.

use crate::plan::WorkItem;
use bytesize::ByteSize;
use chrono::{DateTime, Local};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::warn;

/// Format a byte count for display, e.g. `15.0 MiB`
pub fn format_size(bytes: u64) -> String {
    ByteSize::b(bytes).display().iec().to_string()
}

/// Size of the file at `path`, or `None` if it does not exist
pub fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}

/// Counters collected while a batch runs
#[derive(Debug, Clone)]
pub struct BatchStatistics {
    pub total_files_planned: usize,
    pub started: Instant,
    pub total_bytes_before: u64,
    pub encoded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchStatistics {
    /// Start the clock and size up the planned sources.
    ///
    /// A source that vanished since planning counts as zero bytes.
    pub fn begin(items: &[WorkItem]) -> Self {
        let total_bytes_before = items
            .iter()
            .map(|item| match fs::metadata(&item.source_path) {
                Ok(m) => m.len(),
                Err(e) => {
                    warn!(path = %item.source_path.display(), error = %e, "cannot stat source");
                    0
                }
            })
            .sum();

        Self {
            total_files_planned: items.len(),
            started: Instant::now(),
            total_bytes_before,
            encoded: 0,
            skipped: 0,
            failed: 0,
        }
    }

    /// Close the run and build the summary.
    ///
    /// The after-size only counts outputs present right now, so items that
    /// failed without leaving an output contribute nothing.
    pub fn finish(&self, items: &[WorkItem]) -> BatchSummary {
        let total_bytes_after = items
            .iter()
            .filter_map(|item| file_size(&item.output_path))
            .sum();

        BatchSummary {
            total_files: self.total_files_planned,
            elapsed: self.started.elapsed(),
            finished_at: Local::now(),
            total_bytes_before: self.total_bytes_before,
            total_bytes_after,
            encoded: self.encoded,
            skipped: self.skipped,
            failed: self.failed,
        }
    }
}

/// Final report of a batch run
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub total_files: usize,
    pub elapsed: Duration,
    pub finished_at: DateTime<Local>,
    pub total_bytes_before: u64,
    pub total_bytes_after: u64,
    pub encoded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    /// Fraction of the original size saved, if anything was measured
    pub fn savings_ratio(&self) -> Option<f64> {
        if self.total_bytes_before == 0 {
            return None;
        }
        Some(1.0 - self.total_bytes_after as f64 / self.total_bytes_before as f64)
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = Duration::from_secs(self.elapsed.as_secs());

        writeln!(f, "--- Batch summary ---")?;
        writeln!(f, "Total files:       {}", self.total_files)?;
        writeln!(
            f,
            "Encoded/skipped/failed: {}/{}/{}",
            self.encoded, self.skipped, self.failed
        )?;
        writeln!(f, "Processing time:   {}", humantime::format_duration(elapsed))?;
        writeln!(
            f,
            "Finished at:       {}",
            self.finished_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(f, "Size before:       {}", format_size(self.total_bytes_before))?;
        write!(f, "Size after:        {}", format_size(self.total_bytes_after))?;
        if let Some(ratio) = self.savings_ratio() {
            write!(f, " ({:.1}% saved)", ratio * 100.0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn item(dir: &Path, index: usize, name: &str) -> WorkItem {
        WorkItem {
            index,
            source_path: dir.join(format!("{}.mp4", name)),
            output_path: dir.join(format!("{}_compressed.mp4", name)),
        }
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1024), "1.0 KiB");
        assert_eq!(format_size(15 * 1024 * 1024), "15.0 MiB");
    }

    #[test]
    fn test_file_size_missing() {
        assert_eq!(file_size(&PathBuf::from("/nonexistent/file.mp4")), None);
    }

    #[test]
    fn test_statistics_sizes_before_and_after() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let items = vec![item(root, 0, "a"), item(root, 1, "b"), item(root, 2, "gone")];
        fs::write(&items[0].source_path, vec![0u8; 1000]).unwrap();
        fs::write(&items[1].source_path, vec![0u8; 2000]).unwrap();

        let mut stats = BatchStatistics::begin(&items);
        assert_eq!(stats.total_files_planned, 3);
        assert_eq!(stats.total_bytes_before, 3000);

        // only a produced an output
        fs::write(&items[0].output_path, vec![0u8; 500]).unwrap();
        stats.encoded = 1;
        stats.failed = 2;

        let summary = stats.finish(&items);
        assert_eq!(summary.total_files, 3);
        assert_eq!(summary.total_bytes_before, 3000);
        assert_eq!(summary.total_bytes_after, 500);
        assert_eq!(summary.encoded, 1);
        assert_eq!(summary.failed, 2);
    }

    #[test]
    fn test_summary_display_contains_report_fields() {
        let summary = BatchSummary {
            total_files: 2,
            elapsed: Duration::from_millis(61_500),
            finished_at: Local::now(),
            total_bytes_before: 30 * 1024 * 1024,
            total_bytes_after: 15 * 1024 * 1024,
            encoded: 2,
            skipped: 0,
            failed: 0,
        };

        let report = summary.to_string();
        assert!(report.contains("Total files:       2"));
        assert!(report.contains("1m 1s"));
        assert!(report.contains("30.0 MiB"));
        assert!(report.contains("15.0 MiB"));
        assert!(report.contains("50.0% saved"));
        assert!(report.contains("Finished at:"));
    }

    #[test]
    fn test_savings_ratio_empty_batch() {
        let summary = BatchSummary {
            total_files: 0,
            elapsed: Duration::ZERO,
            finished_at: Local::now(),
            total_bytes_before: 0,
            total_bytes_after: 0,
            encoded: 0,
            skipped: 0,
            failed: 0,
        };
        assert_eq!(summary.savings_ratio(), None);
        assert!(!summary.to_string().contains("saved"));
    }
}
