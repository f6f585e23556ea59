//! Step directory discovery and JSONL record reading.
//!
//! Logs are laid out as `root/step_<n>/<worker>.jsonl`. This module finds
//! the step directories, lists their worker files, and streams parsed
//! records out of them while counting what had to be skipped.

use crate::models::LogRecord;
use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Inclusive bounds on the step indices an all-steps scan will visit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepRange {
    pub first: Option<i64>,
    pub last: Option<i64>,
}

impl StepRange {
    pub fn contains(&self, step: i64) -> bool {
        self.first.map_or(true, |first| step >= first) && self.last.map_or(true, |last| step <= last)
    }
}

/// Configuration for log discovery.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Directory name prefix in front of the step index.
    pub step_prefix: String,
    /// Worker file extension (without dot).
    pub extension: String,
    /// Steps to visit when no single step is targeted.
    pub range: StepRange,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            step_prefix: "step_".to_string(),
            extension: "jsonl".to_string(),
            range: StepRange::default(),
        }
    }
}

impl From<&crate::config::ScanSettings> for ScanConfig {
    fn from(settings: &crate::config::ScanSettings) -> Self {
        Self {
            step_prefix: settings.step_prefix.clone(),
            extension: settings.extension.clone(),
            range: StepRange {
                first: settings.first_step,
                last: settings.last_step,
            },
        }
    }
}

/// One worker's log file inside a step directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFile {
    pub step: i64,
    /// File stem, e.g. `worker_3`.
    pub worker: String,
    pub path: PathBuf,
}

/// A `step_<n>` directory and the worker files it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDirectory {
    pub step: i64,
    pub files: Vec<WorkerFile>,
}

/// Counters describing how much input an aggregation consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Worker files opened successfully.
    pub files_read: usize,
    /// Lines that parsed into a record.
    pub records: usize,
    /// Non-blank lines that were not a JSON object with an `event`.
    pub skipped_lines: usize,
    /// Files that could not be opened or read to the end.
    pub unreadable_files: usize,
}

impl std::ops::AddAssign for ScanStats {
    fn add_assign(&mut self, other: Self) {
        self.files_read += other.files_read;
        self.records += other.records;
        self.skipped_lines += other.skipped_lines;
        self.unreadable_files += other.unreadable_files;
    }
}

/// Finds step directories and reads their worker files.
pub struct LogScanner {
    root: PathBuf,
    config: ScanConfig,
}

impl LogScanner {
    /// Create a scanner rooted at `root`.
    pub fn new(root: PathBuf, config: ScanConfig) -> Self {
        Self { root, config }
    }

    /// Parse the step index out of a directory name such as `step_12`.
    pub fn parse_step_name(&self, name: &str) -> Option<i64> {
        name.strip_prefix(&self.config.step_prefix)?.parse().ok()
    }

    /// Every step directory under the root (recursively), steps ascending,
    /// restricted to the configured range.
    ///
    /// Directories whose name does not parse as a step are skipped. Two
    /// directories with the same step index (e.g. in separate run folders)
    /// contribute to the same step.
    pub fn step_dirs(&self) -> Result<Vec<StepDirectory>> {
        self.ensure_root()?;

        let mut steps: BTreeMap<i64, Vec<WorkerFile>> = BTreeMap::new();

        for entry in WalkDir::new(&self.root).min_depth(1).follow_links(true) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("Cannot walk entry under {}: {}", self.root.display(), e);
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            let Some(step) = self.parse_step_name(&name) else {
                continue;
            };

            if !self.config.range.contains(step) {
                debug!("Step {} outside configured range, skipping", step);
                continue;
            }

            let files = self.list_worker_files(entry.path(), step);
            steps.entry(step).or_default().extend(files);
        }

        Ok(steps
            .into_iter()
            .map(|(step, files)| StepDirectory { step, files })
            .collect())
    }

    /// The directory `root/step_<n>`, or `None` if it does not exist.
    pub fn step_dir(&self, step: i64) -> Result<Option<StepDirectory>> {
        self.ensure_root()?;

        let dir = self.root.join(format!("{}{}", self.config.step_prefix, step));
        if !dir.is_dir() {
            debug!("Step directory not found: {}", dir.display());
            return Ok(None);
        }

        Ok(Some(StepDirectory {
            step,
            files: self.list_worker_files(&dir, step),
        }))
    }

    /// Worker files directly inside `dir`, sorted by file name.
    fn list_worker_files(&self, dir: &Path, step: i64) -> Vec<WorkerFile> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!("Cannot read step directory {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        let mut files: Vec<WorkerFile> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && self.matches(path))
            .map(|path| WorkerFile {
                step,
                worker: path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default(),
                path,
            })
            .collect();

        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// Check if a file has the worker log extension.
    fn matches(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(self.config.extension.as_str())
    }

    fn ensure_root(&self) -> Result<()> {
        if !self.root.is_dir() {
            bail!("Log directory is not readable: {}", self.root.display());
        }
        Ok(())
    }

    /// Stream every record of `file` into `visit`, counting skipped lines.
    ///
    /// Blank lines are ignored without being counted. A file that cannot be
    /// opened is logged and counted, never fatal.
    pub fn read_records<F>(&self, file: &WorkerFile, stats: &mut ScanStats, mut visit: F)
    where
        F: FnMut(LogRecord),
    {
        let handle = match File::open(&file.path) {
            Ok(h) => h,
            Err(e) => {
                warn!("Failed to open {}: {}", file.path.display(), e);
                stats.unreadable_files += 1;
                return;
            }
        };
        stats.files_read += 1;

        for line in BufReader::new(handle).split(b'\n') {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!("Failed to read {}: {}", file.path.display(), e);
                    stats.unreadable_files += 1;
                    break;
                }
            };

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match LogRecord::parse_line(&line) {
                Some(record) => {
                    stats.records += 1;
                    visit(record);
                }
                None => stats.skipped_lines += 1,
            }
        }
    }

    /// Parse only the first line of `file`.
    pub fn read_first_record(&self, file: &WorkerFile, stats: &mut ScanStats) -> Option<LogRecord> {
        let handle = match File::open(&file.path) {
            Ok(h) => h,
            Err(e) => {
                warn!("Failed to open {}: {}", file.path.display(), e);
                stats.unreadable_files += 1;
                return None;
            }
        };
        stats.files_read += 1;

        let mut first = Vec::new();
        if let Err(e) = BufReader::new(handle).read_until(b'\n', &mut first) {
            warn!("Failed to read {}: {}", file.path.display(), e);
            stats.unreadable_files += 1;
            return None;
        }

        if first.iter().all(u8::is_ascii_whitespace) {
            return None;
        }

        let record = LogRecord::parse_line(&first);
        match record {
            Some(_) => stats.records += 1,
            None => stats.skipped_lines += 1,
        }
        record
    }
}
