//! Progress events and cooperative cancellation.
//!
//! The core never talks to a terminal or a window directly. Every stage of a
//! run reports what it is doing through an [`EventSink`]; the CLI renders those
//! events with colors and a progress bar, tests collect them, and library users
//! can plug in whatever observer they like (any `Fn(&Event)` closure works).

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Something that happened during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Scanning of the source root has started.
    ScanStarted { root: PathBuf },
    /// A file could not be read and was skipped.
    FileUnreadable { path: PathBuf, reason: String },
    /// Scanning (and filtering) is complete.
    ScanFinished { files: usize, filtered_out: usize },
    /// A file was assigned a category.
    Categorized {
        path: PathBuf,
        category: String,
        confidence: f64,
    },
    /// A file could not be hashed and was left out of duplicate grouping.
    HashFailed { path: PathBuf, reason: String },
    /// Duplicate detection finished.
    DuplicatesFound { groups: usize, wasted_bytes: u64 },
    /// Placement is about to start for `total` files.
    PlacementStarted { total: usize, dry_run: bool },
    /// Dry-run: the file would be copied to `destination`.
    Previewed {
        source: PathBuf,
        destination: PathBuf,
    },
    /// The file was copied to `destination`.
    Copied {
        source: PathBuf,
        destination: PathBuf,
    },
    /// The file's operation failed; the run continues.
    PlacementFailed { source: PathBuf, reason: String },
    /// The run was cancelled before `remaining` files were placed.
    Cancelled { remaining: usize },
    /// The run is complete.
    RunFinished { copied: usize, failed: usize },
}

/// Receives progress events from the core.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

impl<F> EventSink for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn emit(&self, event: &Event) {
        self(event)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSink;

impl EventSink for SilentSink {
    fn emit(&self, _event: &Event) {}
}

/// Shared flag checked between files to stop a run early.
///
/// Cloning the token shares the flag, so a signal handler or another thread
/// can hold one copy while the run holds another.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
