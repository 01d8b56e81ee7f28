//! dirsort - classify files and copy them into a conflict-free target tree
//!
//! This library scans a source tree, scores every file against a table of
//! weighted category rules, optionally finds byte-identical duplicates, and
//! copies each file to a unique destination under a target root. Every copy is
//! recorded in an append-only journal so a run can be undone.

pub mod cli;
pub mod config;
pub mod duplicates;
pub mod events;
pub mod file_category;
pub mod file_organizer;
pub mod journal;
pub mod logging;
pub mod output;
pub mod placement;
pub mod scanner;
pub mod statistics;
pub mod undo;

pub use config::{CompiledFilters, Config, ConfigError};
pub use duplicates::{DuplicateDetector, DuplicateGroup, DuplicateReport, HashAlgorithm};
pub use events::{CancelToken, Event, EventSink, SilentSink};
pub use file_category::{
    CategorizationResult, CategoryDefinition, CategorySet, RuleEngine, SubtypeMapper,
};
pub use file_organizer::{FileOrganizer, Issue, Organizer, RunError, RunSummary, Survey};
pub use journal::{ActionKind, Journal, JournalError, OperationRecord, Status};
pub use placement::{Placement, PlacementError, PlacementOptions, PlacementState, Planner, Strategy};
pub use scanner::{FileRecord, ScanError, ScanItem, Scanner};
pub use statistics::RunStatistics;
pub use undo::{UndoManager, UndoReport};

pub use cli::{Cli, run_cli};
