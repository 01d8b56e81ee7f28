//! Destination planning.
//!
//! Turns a categorized file into a concrete, conflict-free destination below
//! the target root. All claims of a run go through a single [`Planner`], so two
//! files that want the same path always end up with distinct names.

use crate::file_category::{CategorizationResult, SubtypeMapper};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Upper bound on numeric suffixes tried before giving up on a file.
pub const MAX_CONFLICT_ATTEMPTS: usize = 1000;

/// Per-file failures of the planning and copying stages.
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("no free name for {} after {attempts} attempts", path.display())]
    ConflictResolutionExhausted { path: PathBuf, attempts: usize },
    #[error("failed to create directory {}: {source}", path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },
    #[error("failed to copy {} to {}: {source}", from.display(), to.display())]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

/// Result type for placement operations.
pub type PlacementResult<T> = Result<T, PlacementError>;

/// How destinations are laid out below the target root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// `target / source_dir / category / subtype / file`
    #[default]
    Category,
    /// `target / source_dir / YYYY-MM / file`, from the modification time.
    Date,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Category => f.write_str("category"),
            Strategy::Date => f.write_str("date"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "category" => Ok(Strategy::Category),
            "date" => Ok(Strategy::Date),
            other => Err(format!(
                "unknown strategy '{}': expected category or date",
                other
            )),
        }
    }
}

/// Layout switches for the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementOptions {
    pub strategy: Strategy,
    /// Add the extension-derived subtype level (category strategy only).
    pub subcategorize: bool,
    /// Mirror the file's directory relative to the source root.
    pub preserve_structure: bool,
}

impl Default for PlacementOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::Category,
            subcategorize: true,
            preserve_structure: true,
        }
    }
}

/// Where a file is going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub category: String,
    pub size: u64,
    pub state: PlacementState,
}

impl Placement {
    /// Moves to `next`, which must be a legal successor of the current state.
    pub fn advance(&mut self, next: PlacementState) {
        debug_assert!(
            self.state.can_become(next),
            "illegal placement transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }
}

/// Lifecycle of one placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementState {
    Planned,
    /// Dry-run terminal state.
    Previewed,
    Executing,
    Done,
    Failed,
}

impl PlacementState {
    /// `Planned -> Previewed`, or `Planned -> Executing -> Done | Failed`.
    pub fn can_become(self, next: PlacementState) -> bool {
        use PlacementState::*;
        matches!(
            (self, next),
            (Planned, Previewed) | (Planned, Executing) | (Executing, Done) | (Executing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlacementState::Previewed | PlacementState::Done | PlacementState::Failed
        )
    }
}

/// Computes destinations and remembers every path claimed in this run.
#[derive(Debug)]
pub struct Planner {
    target_root: PathBuf,
    options: PlacementOptions,
    subtypes: SubtypeMapper,
    claimed: HashSet<PathBuf>,
}

impl Planner {
    pub fn new(target_root: &Path, options: PlacementOptions, subtypes: SubtypeMapper) -> Self {
        Self {
            target_root: target_root.to_path_buf(),
            options,
            subtypes,
            claimed: HashSet::new(),
        }
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    /// The destination a file would get if nothing were in the way.
    pub fn base_destination(&self, result: &CategorizationResult) -> PathBuf {
        let record = &result.record;
        let mut destination = self.target_root.clone();
        if self.options.preserve_structure && !record.relative_dir().as_os_str().is_empty() {
            destination.push(record.relative_dir());
        }
        match self.options.strategy {
            Strategy::Category => {
                destination.push(&result.category);
                if self.options.subcategorize {
                    destination.push(self.subtypes.subtype_for(&record.extension));
                }
            }
            Strategy::Date => {
                destination.push(record.modified.format("%Y-%m").to_string());
            }
        }
        let file_name = record
            .path
            .file_name()
            .unwrap_or_else(|| OsStr::new(&record.name));
        destination.push(file_name);
        destination
    }

    /// Plans `result` and claims its destination for the rest of the run.
    ///
    /// # Errors
    ///
    /// `ConflictResolutionExhausted` when every candidate name is taken,
    /// either on disk or by an earlier claim.
    pub fn plan(&mut self, result: &CategorizationResult) -> PlacementResult<Placement> {
        let base = self.base_destination(result);
        let destination = resolve_conflict(&base, |candidate| self.is_taken(candidate))?;
        if destination != base {
            debug!(base = %base.display(), resolved = %destination.display(), "destination renamed");
        }
        self.claimed.insert(destination.clone());
        Ok(Placement {
            source: result.record.path.clone(),
            destination,
            category: result.category.clone(),
            size: result.record.size,
            state: PlacementState::Planned,
        })
    }

    /// True when `path` exists on disk or was claimed earlier in this run.
    pub fn is_taken(&self, path: &Path) -> bool {
        self.claimed.contains(path) || path.symlink_metadata().is_ok()
    }
}

/// Finds the first free variant of `base`: `base` itself, then `name_1.ext`,
/// `name_2.ext`, … up to [`MAX_CONFLICT_ATTEMPTS`] suffixes.
pub fn resolve_conflict(
    base: &Path,
    is_taken: impl Fn(&Path) -> bool,
) -> PlacementResult<PathBuf> {
    if !is_taken(base) {
        return Ok(base.to_path_buf());
    }
    (1..=MAX_CONFLICT_ATTEMPTS)
        .map(|n| with_suffix(base, n))
        .find(|candidate| !is_taken(candidate))
        .ok_or_else(|| PlacementError::ConflictResolutionExhausted {
            path: base.to_path_buf(),
            attempts: MAX_CONFLICT_ATTEMPTS,
        })
}

/// Inserts `_n` right before the extension.
///
/// ```
/// use dirsort::placement::with_suffix;
/// use std::path::Path;
///
/// assert_eq!(with_suffix(Path::new("a/report.pdf"), 2), Path::new("a/report_2.pdf"));
/// assert_eq!(with_suffix(Path::new("a/Makefile"), 1), Path::new("a/Makefile_1"));
/// ```
pub fn with_suffix(path: &Path, n: usize) -> PathBuf {
    let mut name = path
        .file_stem()
        .map(OsStr::to_os_string)
        .unwrap_or_default();
    name.push(format!("_{}", n));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}
