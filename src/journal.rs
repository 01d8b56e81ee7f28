//! Append-only operation journal.
//!
//! Every copy made by a run is recorded here before it happens (write-ahead)
//! and updated once it is done. On disk a journal is JSON lines: a header, then
//! one line per record state. Lines are only ever appended, and the last line
//! for a sequence number is the record's current state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Default journal directory, relative to the target root.
pub const JOURNAL_DIR_NAME: &str = ".dirsort";

const JOURNAL_PREFIX: &str = "run-";
const JOURNAL_SUFFIX: &str = ".jsonl";

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Errors raised while persisting or reading journals.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("failed to write journal {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },
    #[error("failed to read journal {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },
    #[error("invalid journal {}: {reason}", path.display())]
    InvalidFormat { path: PathBuf, reason: String },
    #[error("no journal found in {}", dir.display())]
    NotFound { dir: PathBuf },
    #[error("journal has no record with sequence number {seq}")]
    UnknownRecord { seq: u64 },
}

/// Result type for journal operations.
pub type JournalResult<T> = Result<T, JournalError>;

/// What a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionKind {
    Plan,
    Copy,
    Skip,
    Undo,
}

/// Where a record is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pending,
    Done,
    Failed,
    Undone,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionKind::Plan => "PLAN",
            ActionKind::Copy => "COPY",
            ActionKind::Skip => "SKIP",
            ActionKind::Undo => "UNDO",
        };
        f.write_str(label)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Pending => "PENDING",
            Status::Done => "DONE",
            Status::Failed => "FAILED",
            Status::Undone => "UNDONE",
        };
        f.write_str(label)
    }
}

/// One entry of the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Assigned by [`Journal::append`], starting at 1.
    pub seq: u64,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub action: ActionKind,
    pub status: Status,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub category: Option<String>,
    /// Directories that did not exist before this operation, outermost first.
    #[serde(default)]
    pub created_dirs: Vec<PathBuf>,
}

impl OperationRecord {
    pub fn new(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        action: ActionKind,
        status: Status,
    ) -> Self {
        Self {
            seq: 0,
            source: source.into(),
            destination: destination.into(),
            action,
            status,
            timestamp: Utc::now(),
            category: None,
            created_dirs: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_created_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.created_dirs = dirs;
        self
    }

    /// A copy that completed and has not been reverted.
    pub fn is_completed_copy(&self) -> bool {
        self.action == ActionKind::Copy && self.status == Status::Done
    }

    /// A copy announced but never settled, typically left by a crash.
    pub fn is_pending(&self) -> bool {
        self.action == ActionKind::Plan && self.status == Status::Pending
    }
}

/// First line of a journal file.
#[derive(Debug, Serialize, Deserialize)]
struct JournalHeader {
    run_id: String,
    started_at: DateTime<Utc>,
    source_root: PathBuf,
    target_root: PathBuf,
}

/// Ordered log of one run's operations.
#[derive(Debug, Clone)]
pub struct Journal {
    path: Option<PathBuf>,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub source_root: PathBuf,
    pub target_root: PathBuf,
    records: Vec<OperationRecord>,
    /// Position of each sequence number in `records`.
    index: HashMap<u64, usize>,
}

impl Journal {
    /// Starts a new journal file `run-<run_id>.jsonl` inside `dir`. The header
    /// line is synced before this returns, so the run is visible even before
    /// the first record.
    ///
    /// # Errors
    ///
    /// `WriteFailed` if the directory cannot be created or the file written.
    pub fn create(dir: &Path, source_root: &Path, target_root: &Path) -> JournalResult<Self> {
        fs::create_dir_all(dir).map_err(|e| write_failed(dir, e))?;

        let mut journal = Self::in_memory(source_root, target_root);
        let file_name = format!("{}{}{}", JOURNAL_PREFIX, journal.run_id, JOURNAL_SUFFIX);
        let path = dir.join(file_name);
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .and_then(|mut file| write_line(&mut file, &journal.header(), true))
            .map_err(|e| write_failed(&path, e))?;

        journal.path = Some(path);
        debug!(run_id = %journal.run_id, "journal created");
        Ok(journal)
    }

    /// A journal that is never written to disk.
    pub fn in_memory(source_root: &Path, target_root: &Path) -> Self {
        Self {
            path: None,
            run_id: new_run_id(),
            started_at: Utc::now(),
            source_root: source_root.to_path_buf(),
            target_root: target_root.to_path_buf(),
            records: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Reads a journal file back.
    ///
    /// Lines after the header are record states; the last line for a
    /// sequence number wins. A final line cut short by a crash is ignored.
    pub fn load(path: &Path) -> JournalResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| JournalError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        let invalid = |reason: String| JournalError::InvalidFormat {
            path: path.to_path_buf(),
            reason,
        };

        let mut lines = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .peekable();
        let (_, first) = lines
            .next()
            .ok_or_else(|| invalid("empty journal".to_string()))?;
        let header: JournalHeader =
            serde_json::from_str(first).map_err(|e| invalid(format!("header: {}", e)))?;

        let mut journal = Self {
            path: Some(path.to_path_buf()),
            run_id: header.run_id,
            started_at: header.started_at,
            source_root: header.source_root,
            target_root: header.target_root,
            records: Vec::new(),
            index: HashMap::new(),
        };
        while let Some((number, line)) = lines.next() {
            match serde_json::from_str::<OperationRecord>(line) {
                Ok(record) => journal.apply(record),
                Err(e) if lines.peek().is_none() && !content.ends_with('\n') => {
                    warn!(path = %path.display(), line = number + 1, error = %e, "ignoring truncated journal line");
                }
                Err(e) => return Err(invalid(format!("line {}: {}", number + 1, e))),
            }
        }
        Ok(journal)
    }

    /// Journal files in `dir`, oldest first. A missing directory has none.
    pub fn list(dir: &Path) -> JournalResult<Vec<PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(JournalError::ReadFailed {
                    path: dir.to_path_buf(),
                    source: e,
                });
            }
        };

        let mut journals: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(JOURNAL_PREFIX) && n.ends_with(JOURNAL_SUFFIX))
            })
            .collect();
        journals.sort();
        Ok(journals)
    }

    /// Loads the most recent journal in `dir`.
    pub fn latest(dir: &Path) -> JournalResult<Self> {
        let newest = Self::list(dir)?
            .pop()
            .ok_or_else(|| JournalError::NotFound {
                dir: dir.to_path_buf(),
            })?;
        Self::load(&newest)
    }

    /// Where this journal is persisted, if anywhere.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn records(&self) -> &[OperationRecord] {
        &self.records
    }

    pub fn get(&self, seq: u64) -> Option<&OperationRecord> {
        self.index.get(&seq).map(|&position| &self.records[position])
    }

    /// Appends `record` with the next sequence number.
    ///
    /// The line is synced to disk before this returns.
    pub fn append(&mut self, mut record: OperationRecord) -> JournalResult<u64> {
        let seq = self.records.last().map_or(1, |last| last.seq + 1);
        record.seq = seq;
        record.timestamp = Utc::now();
        self.persist(&record, true)?;
        self.apply(record);
        Ok(seq)
    }

    /// Moves record `seq` to a new action and status and persists.
    pub fn update(&mut self, seq: u64, action: ActionKind, status: Status) -> JournalResult<()> {
        self.update_with(seq, |record| {
            record.action = action;
            record.status = status;
        })
    }

    /// Applies `change` to record `seq`, refreshes its timestamp and appends
    /// the new state.
    ///
    /// A `DONE` state is not synced: if it is lost the record reads back as
    /// pending, which undo reverts the same way.
    pub fn update_with(
        &mut self,
        seq: u64,
        change: impl FnOnce(&mut OperationRecord),
    ) -> JournalResult<()> {
        let position = *self
            .index
            .get(&seq)
            .ok_or(JournalError::UnknownRecord { seq })?;
        let mut record = self.records[position].clone();
        change(&mut record);
        record.timestamp = Utc::now();
        self.persist(&record, record.status != Status::Done)?;
        self.records[position] = record;
        Ok(())
    }

    /// `(local_destination, remote_path)` for every completed copy, in journal
    /// order. The remote path is the destination relative to the target root,
    /// joined with `/`.
    pub fn upload_pairs(&self) -> Vec<(PathBuf, String)> {
        self.records
            .iter()
            .filter(|r| r.is_completed_copy())
            .map(|r| {
                let relative = r
                    .destination
                    .strip_prefix(&self.target_root)
                    .unwrap_or(&r.destination);
                let remote = relative
                    .components()
                    .filter_map(|c| match c {
                        Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("/");
                (r.destination.clone(), remote)
            })
            .collect()
    }

    fn header(&self) -> JournalHeader {
        JournalHeader {
            run_id: self.run_id.clone(),
            started_at: self.started_at,
            source_root: self.source_root.clone(),
            target_root: self.target_root.clone(),
        }
    }

    /// Inserts a new record or replaces the state of an existing one.
    fn apply(&mut self, record: OperationRecord) {
        match self.index.get(&record.seq) {
            Some(&position) => self.records[position] = record,
            None => {
                self.index.insert(record.seq, self.records.len());
                self.records.push(record);
            }
        }
    }

    fn persist(&self, record: &OperationRecord, sync: bool) -> JournalResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        OpenOptions::new()
            .append(true)
            .open(path)
            .and_then(|mut file| write_line(&mut file, record, sync))
            .map_err(|e| {
                error!(path = %path.display(), error = %e, "journal write failed");
                write_failed(path, e)
            })
    }
}

/// Writes `value` as one JSON line with a single `write_all`.
fn write_line<T: Serialize>(file: &mut File, value: &T, sync: bool) -> io::Result<()> {
    let mut line = serde_json::to_vec(value).map_err(io::Error::other)?;
    line.push(b'\n');
    file.write_all(&line)?;
    if sync {
        file.sync_all()?;
    }
    Ok(())
}

fn write_failed(path: &Path, source: io::Error) -> JournalError {
    JournalError::WriteFailed {
        path: path.to_path_buf(),
        source,
    }
}

/// Sortable, unique-per-process run identifier.
fn new_run_id() -> String {
    let counter = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}-{}-{:04}",
        Utc::now().format("%Y%m%dT%H%M%S%3f"),
        std::process::id(),
        counter
    )
}
