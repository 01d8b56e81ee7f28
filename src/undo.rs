//! Undo functionality for reverting organization runs.
//!
//! An organization run only ever copies, so undoing it means deleting the
//! copies it made and the directories it created for them. The journal of the
//! run says exactly which those are; records are never erased, reverted ones
//! are marked `UNDONE` and an `UNDO` record is appended for each.
use crate::journal::{ActionKind, Journal, JournalResult, OperationRecord, Status};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Represents the result of an undo operation.
#[derive(Debug, Default)]
pub struct UndoReport {
    /// Copies deleted from the target tree.
    pub reverted: usize,
    /// Records whose destination was already gone.
    pub already_absent: usize,
    /// Destinations that could not be removed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
    /// Directories removed because the run had created them and they are empty.
    pub dirs_removed: usize,
}

impl UndoReport {
    /// Returns the total number of records processed.
    pub fn total_processed(&self) -> usize {
        self.reverted + self.already_absent + self.failed.len()
    }

    /// Returns true if every record was reverted.
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Manages undo operations for organization runs.
pub struct UndoManager;

impl UndoManager {
    /// Reverts every completed copy of `journal`, newest first.
    ///
    /// Records left `PENDING` by an interrupted run are reverted too, removing
    /// whatever partial destination they left behind.
    ///
    /// # Edge Cases Handled
    ///
    /// * **Destination already gone**: counted as already absent, still marked `UNDONE`
    /// * **Directory no longer empty**: kept, since it now holds files the run did not create
    /// * **Removal fails**: reported; the record stays `DONE` and undo continues
    ///
    /// # Errors
    ///
    /// Only journal persistence failures abort the undo.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dirsort::journal::Journal;
    /// use dirsort::undo::UndoManager;
    /// use std::path::Path;
    ///
    /// let mut journal = Journal::latest(Path::new("/organized/.dirsort")).unwrap();
    /// let report = UndoManager::undo(&mut journal).unwrap();
    /// println!("Removed {} copies", report.reverted);
    /// ```
    pub fn undo(journal: &mut Journal) -> JournalResult<UndoReport> {
        let pending: Vec<OperationRecord> = journal
            .records()
            .iter()
            .rev()
            .filter(|r| r.is_completed_copy() || r.is_pending())
            .cloned()
            .collect();

        info!(run_id = %journal.run_id, records = pending.len(), "undoing run");

        let mut report = UndoReport::default();
        for record in pending {
            match Self::remove_destination(&record.destination) {
                Ok(true) => report.reverted += 1,
                Ok(false) => report.already_absent += 1,
                Err(reason) => {
                    warn!(path = %record.destination.display(), %reason, "undo failed");
                    report.failed.push((record.destination.clone(), reason));
                    continue;
                }
            }

            report.dirs_removed += remove_empty_dirs(&record.created_dirs);

            journal.append(
                OperationRecord::new(&record.destination, &record.source, ActionKind::Undo, Status::Done)
                    .with_created_dirs(record.created_dirs.clone()),
            )?;
            journal.update_with(record.seq, |r| r.status = Status::Undone)?;
        }

        Ok(report)
    }

    /// Deletes `path` if it is a regular file. `Ok(false)` when it is absent.
    fn remove_destination(path: &Path) -> Result<bool, String> {
        match path.symlink_metadata() {
            Ok(metadata) if metadata.is_file() => fs::remove_file(path)
                .map(|_| true)
                .map_err(|e| format!("Failed to remove copy: {}", e)),
            Ok(_) => Err("Destination is no longer a regular file".to_string()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(format!("Could not inspect destination: {}", e)),
        }
    }
}

/// Removes the given directories innermost first, stopping at the first one
/// that is not empty. Returns how many were removed.
pub(crate) fn remove_empty_dirs(dirs: &[PathBuf]) -> usize {
    let mut removed = 0;
    for dir in dirs.iter().rev() {
        let is_empty = fs::read_dir(dir).map(|mut entries| entries.next().is_none());
        match is_empty {
            Ok(true) => match fs::remove_dir(dir) {
                Ok(()) => {
                    debug!(dir = %dir.display(), "removed created directory");
                    removed += 1;
                }
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "could not remove directory");
                    break;
                }
            },
            Ok(false) => break,
            // Already gone, e.g. removed by an earlier record.
            Err(_) => continue,
        }
    }
    removed
}
