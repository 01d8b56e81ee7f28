//! Copy execution and the end-to-end organize pipeline.
//!
//! [`FileOrganizer`] performs one journaled copy: it announces the operation in
//! the journal, creates the missing directories, copies with create-new
//! semantics so nothing is ever overwritten, and settles the record as `DONE`
//! or `FAILED`. [`Organizer`] drives a whole run on top of it:
//! scan → filter → categorize (→ duplicates) → plan → execute → statistics.

use crate::config::{CompiledFilters, Config, ConfigError};
use crate::duplicates::{DuplicateDetector, DuplicateReport};
use crate::events::{CancelToken, Event, EventSink};
use crate::file_category::{CategorizationResult, CategorySet, RuleEngine};
use crate::journal::{ActionKind, Journal, JournalError, JournalResult, OperationRecord, Status};
use crate::placement::{Placement, PlacementError, PlacementState, Planner};
use crate::scanner::{FileRecord, ScanError, ScanItem, Scanner};
use crate::statistics::RunStatistics;
use crate::undo::remove_empty_dirs;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fmt;
use std::fs::{self, File, FileTimes, Metadata, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Attempts made for a local I/O step that fails transiently.
pub const MAX_IO_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(25);

/// Errors that stop a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error("invalid target root {}: {source}", path.display())]
    InvalidTarget { path: PathBuf, source: io::Error },
    #[error("failed to start worker threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for whole-run operations.
pub type RunResult<T> = Result<T, RunError>;

/// Kinds of per-file problems a run keeps going after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    FileUnreadable,
    HashComputationFailed,
    ConflictResolutionExhausted,
    DirectoryCreationFailed,
    CopyFailed,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IssueKind::FileUnreadable => "unreadable",
            IssueKind::HashComputationFailed => "hash failed",
            IssueKind::ConflictResolutionExhausted => "no free name",
            IssueKind::DirectoryCreationFailed => "mkdir failed",
            IssueKind::CopyFailed => "copy failed",
        };
        f.write_str(label)
    }
}

/// A per-file problem. Issues are collected, never dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub kind: IssueKind,
    pub path: PathBuf,
    pub reason: String,
}

impl Issue {
    fn placement(source: &Path, error: &PlacementError) -> Self {
        let kind = match error {
            PlacementError::ConflictResolutionExhausted { .. } => {
                IssueKind::ConflictResolutionExhausted
            }
            PlacementError::DirectoryCreationFailed { .. } => IssueKind::DirectoryCreationFailed,
            PlacementError::CopyFailed { .. } => IssueKind::CopyFailed,
        };
        Self {
            kind,
            path: source.to_path_buf(),
            reason: error.to_string(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.path.display(), self.kind, self.reason)
    }
}

/// How a single journaled copy ended.
#[derive(Debug)]
pub enum CopyOutcome {
    Copied { seq: u64 },
    Failed { seq: u64, error: PlacementError },
}

/// Performs journaled copies.
pub struct FileOrganizer;

impl FileOrganizer {
    /// Copies `placement.source` to `placement.destination`, recording every
    /// step in `journal`.
    ///
    /// The `PLAN/PENDING` record, including the directories about to be
    /// created, is persisted before anything is written to the target.
    ///
    /// # Errors
    ///
    /// Only journal failures are returned as `Err`; they abort the run. A
    /// failed copy is `Ok(CopyOutcome::Failed)` and leaves no partial file or
    /// newly created empty directory behind.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dirsort::file_organizer::{CopyOutcome, FileOrganizer};
    /// use dirsort::journal::Journal;
    /// use dirsort::placement::{Placement, PlacementState};
    /// use std::path::{Path, PathBuf};
    ///
    /// let mut journal = Journal::in_memory(Path::new("/inbox"), Path::new("/sorted"));
    /// let mut placement = Placement {
    ///     source: PathBuf::from("/inbox/q3.pdf"),
    ///     destination: PathBuf::from("/sorted/documents/pdf/q3.pdf"),
    ///     category: "documents".to_string(),
    ///     size: 1024,
    ///     state: PlacementState::Planned,
    /// };
    ///
    /// match FileOrganizer::copy_with_record(&mut journal, &mut placement) {
    ///     Ok(CopyOutcome::Copied { seq }) => println!("copied as record {}", seq),
    ///     Ok(CopyOutcome::Failed { error, .. }) => eprintln!("skipped: {}", error),
    ///     Err(e) => eprintln!("journal unusable: {}", e),
    /// }
    /// ```
    pub fn copy_with_record(
        journal: &mut Journal,
        placement: &mut Placement,
    ) -> JournalResult<CopyOutcome> {
        placement.advance(PlacementState::Executing);
        let parent = placement
            .destination
            .parent()
            .unwrap_or_else(|| Path::new(""));
        let created_dirs = missing_ancestors(parent);

        let seq = journal.append(
            OperationRecord::new(
                &placement.source,
                &placement.destination,
                ActionKind::Plan,
                Status::Pending,
            )
            .with_category(&placement.category)
            .with_created_dirs(created_dirs.clone()),
        )?;

        let result = with_retry(|| fs::create_dir_all(parent))
            .map_err(|e| PlacementError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })
            .and_then(|_| {
                with_retry(|| copy_file(&placement.source, &placement.destination)).map_err(|e| {
                    PlacementError::CopyFailed {
                        from: placement.source.clone(),
                        to: placement.destination.clone(),
                        source: e,
                    }
                })
            });

        match result {
            Ok(bytes) => {
                journal.update(seq, ActionKind::Copy, Status::Done)?;
                placement.advance(PlacementState::Done);
                debug!(
                    source = %placement.source.display(),
                    destination = %placement.destination.display(),
                    bytes,
                    "copied"
                );
                Ok(CopyOutcome::Copied { seq })
            }
            Err(error) => {
                remove_empty_dirs(&created_dirs);
                journal.update(seq, ActionKind::Copy, Status::Failed)?;
                placement.advance(PlacementState::Failed);
                warn!(source = %placement.source.display(), %error, "copy failed");
                Ok(CopyOutcome::Failed { seq, error })
            }
        }
    }

    /// Records a file that could not be given a destination.
    pub fn record_skip(
        journal: &mut Journal,
        source: &Path,
        intended: &Path,
        category: &str,
    ) -> JournalResult<u64> {
        journal.append(
            OperationRecord::new(source, intended, ActionKind::Skip, Status::Failed)
                .with_category(category),
        )
    }
}

/// Ancestors of `dir` (itself included) that do not exist yet, outermost first.
fn missing_ancestors(dir: &Path) -> Vec<PathBuf> {
    let mut missing: Vec<PathBuf> = dir
        .ancestors()
        .take_while(|d| !d.as_os_str().is_empty() && d.symlink_metadata().is_err())
        .map(Path::to_path_buf)
        .collect();
    missing.reverse();
    missing
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ResourceBusy
    )
}

/// Runs `op` up to [`MAX_IO_ATTEMPTS`] times while it fails transiently.
fn with_retry<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let mut attempt = 1;
    loop {
        match op() {
            Err(e) if attempt < MAX_IO_ATTEMPTS && is_transient(&e) => {
                debug!(attempt, error = %e, "transient I/O error, retrying");
                thread::sleep(RETRY_BACKOFF * attempt);
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Copies contents, permissions and timestamps. Fails if `destination`
/// exists; on any later failure the partial destination is removed.
fn copy_file(source: &Path, destination: &Path) -> io::Result<u64> {
    let metadata = fs::metadata(source)?;
    let mut reader = File::open(source)?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)?;

    match write_contents(&mut reader, &mut writer, &metadata) {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            drop(writer);
            if let Err(cleanup) = fs::remove_file(destination) {
                warn!(path = %destination.display(), error = %cleanup, "could not remove partial copy");
            }
            Err(e)
        }
    }
}

fn write_contents(reader: &mut File, writer: &mut File, metadata: &Metadata) -> io::Result<u64> {
    let bytes = io::copy(reader, writer)?;
    let mut times = FileTimes::new().set_modified(metadata.modified()?);
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }
    writer.set_times(times)?;
    writer.set_permissions(metadata.permissions())?;
    Ok(bytes)
}

/// Everything known about the source tree before anything is placed.
#[derive(Debug, Default)]
pub struct Survey {
    pub records: Vec<Arc<FileRecord>>,
    pub results: Vec<CategorizationResult>,
    pub duplicates: Option<DuplicateReport>,
    pub issues: Vec<Issue>,
    pub filtered_out: usize,
}

/// Outcome of an organize run.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Option<String>,
    pub dry_run: bool,
    pub survey: Survey,
    /// Planned placements, in order. For a real run these were all attempted.
    pub placements: Vec<Placement>,
    pub statistics: RunStatistics,
    pub journal_path: Option<PathBuf>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn issues(&self) -> &[Issue] {
        &self.survey.issues
    }
}

/// Drives scanning, categorization and placement for one source tree.
pub struct Organizer {
    source_root: PathBuf,
    config: Config,
    dry_run: bool,
}

impl Organizer {
    pub fn new(source_root: &Path, config: Config) -> Self {
        Self {
            source_root: source_root.to_path_buf(),
            config,
            dry_run: false,
        }
    }

    /// Plan and preview only: nothing is created, copied or journaled.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Scans, filters and categorizes the source tree, and finds duplicates
    /// when enabled. Nothing is written anywhere.
    pub fn survey(&self, sink: &dyn EventSink) -> RunResult<Survey> {
        let (categories, filters) = self.compile_rules()?;
        self.survey_excluding(categories, &filters, sink, &[])
    }

    /// Validates the configuration and builds the category table and filters.
    /// Nothing is touched on disk before this succeeds.
    fn compile_rules(&self) -> RunResult<(CategorySet, CompiledFilters)> {
        self.config.validate()?;
        Ok((self.config.category_set()?, self.config.compile_filters()?))
    }

    fn survey_excluding(
        &self,
        categories: CategorySet,
        filters: &CompiledFilters,
        sink: &dyn EventSink,
        excluded: &[PathBuf],
    ) -> RunResult<Survey> {
        let settings = &self.config.organize;
        let pool = ThreadPoolBuilder::new()
            .num_threads(settings.resolved_threads())
            .build()?;

        let mut scanner = Scanner::new(&self.source_root, settings.recursive)?
            .follow_links(settings.follow_links)
            .sample_bytes(settings.sample_bytes);
        for path in excluded {
            scanner = scanner.exclude(path);
        }

        info!(root = %scanner.root().display(), "scanning");
        sink.emit(&Event::ScanStarted {
            root: scanner.root().to_path_buf(),
        });
        let mut survey = collect_records(&scanner, filters, &pool, sink);
        sink.emit(&Event::ScanFinished {
            files: survey.records.len(),
            filtered_out: survey.filtered_out,
        });

        let engine = RuleEngine::new(categories).with_content_hit_cap(settings.content_hit_cap);
        survey.results = pool.install(|| engine.categorize_all(&survey.records));
        for result in &survey.results {
            sink.emit(&Event::Categorized {
                path: result.record.path.clone(),
                category: result.category.clone(),
                confidence: result.confidence,
            });
        }
        info!(files = survey.results.len(), "categorized");

        if self.config.duplicates.enabled {
            let detector = DuplicateDetector::new(self.config.duplicates.algorithm);
            let report = pool.install(|| detector.find_duplicates(&survey.records));
            for failure in &report.failures {
                sink.emit(&Event::HashFailed {
                    path: failure.path.clone(),
                    reason: failure.reason.clone(),
                });
                survey.issues.push(Issue {
                    kind: IssueKind::HashComputationFailed,
                    path: failure.path.clone(),
                    reason: failure.reason.clone(),
                });
            }
            sink.emit(&Event::DuplicatesFound {
                groups: report.groups.len(),
                wasted_bytes: report.total_wasted_space(),
            });
            survey.duplicates = Some(report);
        }

        Ok(survey)
    }

    /// Runs the whole pipeline into `target_root`.
    ///
    /// `cancel` is checked between files; the file in flight is always
    /// settled in the journal first.
    ///
    /// # Errors
    ///
    /// Configuration, scan-root, target-root and journal failures abort the
    /// run. Everything else is reported per file in the summary's issues.
    pub fn run(
        &self,
        target_root: &Path,
        sink: &dyn EventSink,
        cancel: &CancelToken,
    ) -> RunResult<RunSummary> {
        let (categories, filters) = self.compile_rules()?;
        let source = fs::canonicalize(&self.source_root).map_err(|e| ScanError::InvalidRoot {
            path: self.source_root.clone(),
            source: e,
        })?;
        let target = self.prepare_target(target_root)?;
        let journal_dir = self.config.organize.journal_dir_for(&target);
        let mut survey = self.survey_excluding(
            categories,
            &filters,
            sink,
            &[target.clone(), journal_dir.clone()],
        )?;

        let mut journal = if self.dry_run {
            None
        } else {
            Some(Journal::create(&journal_dir, &source, &target)?)
        };

        let mut planner = Planner::new(
            &target,
            self.config.organize.placement_options(),
            self.config.subtype_mapper(),
        );
        let total = survey.results.len();
        sink.emit(&Event::PlacementStarted {
            total,
            dry_run: self.dry_run,
        });
        info!(total, dry_run = self.dry_run, target = %target.display(), "placing files");

        let mut placements = Vec::with_capacity(total);
        let mut cancelled = false;
        let (mut copied, mut failed) = (0, 0);

        for (index, result) in survey.results.iter().enumerate() {
            if cancel.is_cancelled() {
                let remaining = total - index;
                info!(remaining, "run cancelled");
                sink.emit(&Event::Cancelled { remaining });
                cancelled = true;
                break;
            }

            let source = &result.record.path;
            let mut placement = match planner.plan(result) {
                Ok(placement) => placement,
                Err(error) => {
                    if let (Some(journal), PlacementError::ConflictResolutionExhausted { path, .. }) =
                        (journal.as_mut(), &error)
                    {
                        FileOrganizer::record_skip(journal, source, path, &result.category)?;
                    }
                    warn!(source = %source.display(), %error, "no destination");
                    sink.emit(&Event::PlacementFailed {
                        source: source.clone(),
                        reason: error.to_string(),
                    });
                    survey.issues.push(Issue::placement(source, &error));
                    failed += 1;
                    continue;
                }
            };

            match journal.as_mut() {
                None => {
                    placement.advance(PlacementState::Previewed);
                    sink.emit(&Event::Previewed {
                        source: placement.source.clone(),
                        destination: placement.destination.clone(),
                    });
                }
                Some(journal) => match FileOrganizer::copy_with_record(journal, &mut placement) {
                    Ok(CopyOutcome::Copied { .. }) => {
                        copied += 1;
                        sink.emit(&Event::Copied {
                            source: placement.source.clone(),
                            destination: placement.destination.clone(),
                        });
                    }
                    Ok(CopyOutcome::Failed { error, .. }) => {
                        failed += 1;
                        sink.emit(&Event::PlacementFailed {
                            source: placement.source.clone(),
                            reason: error.to_string(),
                        });
                        survey.issues.push(Issue::placement(&placement.source, &error));
                    }
                    Err(e) => {
                        error!(error = %e, "journal write failed, aborting run");
                        return Err(e.into());
                    }
                },
            }
            placements.push(placement);
        }

        let records = journal.as_ref().map_or(&[][..], |j| j.records());
        let statistics = RunStatistics::from_run(&survey.results, records);
        sink.emit(&Event::RunFinished { copied, failed });
        info!(copied, failed, issues = survey.issues.len(), "run finished");

        Ok(RunSummary {
            run_id: journal.as_ref().map(|j| j.run_id.clone()),
            dry_run: self.dry_run,
            survey,
            placements,
            statistics,
            journal_path: journal.as_ref().and_then(|j| j.path().map(Path::to_path_buf)),
            cancelled,
        })
    }

    /// Absolute target root. Created unless this is a dry run.
    fn prepare_target(&self, target_root: &Path) -> RunResult<PathBuf> {
        let invalid = |e| RunError::InvalidTarget {
            path: target_root.to_path_buf(),
            source: e,
        };
        if !self.dry_run {
            fs::create_dir_all(target_root).map_err(invalid)?;
        }
        if target_root.exists() {
            let target = fs::canonicalize(target_root).map_err(invalid)?;
            if !target.is_dir() {
                return Err(invalid(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    "target is not a directory",
                )));
            }
            Ok(target)
        } else {
            std::path::absolute(target_root).map_err(invalid)
        }
    }
}

fn collect_records(
    scanner: &Scanner,
    filters: &CompiledFilters,
    pool: &ThreadPool,
    sink: &dyn EventSink,
) -> Survey {
    let mut survey = Survey::default();
    for item in scanner.extract_all(pool) {
        match item {
            ScanItem::Record(record) if filters.accepts(&record) => {
                survey.records.push(Arc::new(record))
            }
            ScanItem::Record(record) => {
                debug!(path = %record.path.display(), "filtered out");
                survey.filtered_out += 1;
            }
            ScanItem::Unreadable { path, reason } => {
                sink.emit(&Event::FileUnreadable {
                    path: path.clone(),
                    reason: reason.clone(),
                });
                survey.issues.push(Issue {
                    kind: IssueKind::FileUnreadable,
                    path,
                    reason,
                });
            }
        }
    }
    survey
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SilentSink;
    use std::cell::Cell;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn placement(source: &Path, destination: &Path) -> Placement {
        Placement {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            category: "documents".to_string(),
            size: 0,
            state: PlacementState::Planned,
        }
    }

    #[test]
    fn test_copy_with_record_success() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("report.pdf");
        fs::write(&source, "pdf data").expect("Failed to write source");
        let target = temp_dir.path().join("target");
        fs::create_dir(&target).unwrap();
        let destination = target.join("documents").join("pdf").join("report.pdf");

        let mut journal = Journal::in_memory(temp_dir.path(), &target);
        let mut placement = placement(&source, &destination);
        let outcome = FileOrganizer::copy_with_record(&mut journal, &mut placement)
            .expect("Journal failed");

        assert!(matches!(outcome, CopyOutcome::Copied { seq: 1 }));
        assert_eq!(placement.state, PlacementState::Done);
        assert_eq!(fs::read_to_string(&destination).unwrap(), "pdf data");
        assert_eq!(fs::read_to_string(&source).unwrap(), "pdf data");

        let record = &journal.records()[0];
        assert!(record.is_completed_copy());
        assert_eq!(record.category.as_deref(), Some("documents"));
        assert_eq!(
            record.created_dirs,
            vec![target.join("documents"), target.join("documents").join("pdf")]
        );
    }

    #[test]
    fn test_copy_preserves_modification_time() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("old.txt");
        fs::write(&source, "old").unwrap();
        let past = std::time::SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_modified(past)
            .unwrap();
        let destination = temp_dir.path().join("copy.txt");

        let mut journal = Journal::in_memory(temp_dir.path(), temp_dir.path());
        FileOrganizer::copy_with_record(&mut journal, &mut placement(&source, &destination)).unwrap();

        let modified = fs::metadata(&destination).unwrap().modified().unwrap();
        assert_eq!(modified, past);
    }

    #[test]
    fn test_copy_never_overwrites() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("new.txt");
        let destination = temp_dir.path().join("existing.txt");
        fs::write(&source, "new").unwrap();
        fs::write(&destination, "keep me").unwrap();

        let mut journal = Journal::in_memory(temp_dir.path(), temp_dir.path());
        let outcome =
            FileOrganizer::copy_with_record(&mut journal, &mut placement(&source, &destination)).unwrap();

        assert!(matches!(
            outcome,
            CopyOutcome::Failed {
                error: PlacementError::CopyFailed { .. },
                ..
            }
        ));
        assert_eq!(fs::read_to_string(&destination).unwrap(), "keep me");
        assert_eq!(journal.records()[0].status, Status::Failed);
    }

    #[test]
    fn test_failed_copy_removes_created_dirs() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let missing_source = temp_dir.path().join("vanished.txt");
        let destination = temp_dir.path().join("documents").join("txt").join("vanished.txt");

        let mut journal = Journal::in_memory(temp_dir.path(), temp_dir.path());
        let outcome =
            FileOrganizer::copy_with_record(&mut journal, &mut placement(&missing_source, &destination))
                .unwrap();

        assert!(matches!(outcome, CopyOutcome::Failed { .. }));
        assert!(!temp_dir.path().join("documents").exists());
        assert_eq!(journal.records()[0].action, ActionKind::Copy);
    }

    #[test]
    fn test_retry_recovers_from_transient_errors() {
        let calls = Cell::new(0);
        let result = with_retry(|| {
            calls.set(calls.get() + 1);
            if calls.get() < MAX_IO_ATTEMPTS {
                Err(io::Error::from(io::ErrorKind::Interrupted))
            } else {
                Ok(7)
            }
        });

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), MAX_IO_ATTEMPTS);
    }

    #[test]
    fn test_retry_gives_up_on_permanent_errors() {
        let calls = Cell::new(0);
        let result: io::Result<()> = with_retry(|| {
            calls.set(calls.get() + 1);
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        });

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_dry_run_creates_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("inbox");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("song.mp3"), "ID3").unwrap();
        let target = temp_dir.path().join("sorted");

        let events = Mutex::new(Vec::new());
        let sink = |event: &Event| events.lock().unwrap().push(event.clone());
        let summary = Organizer::new(&source, Config::default())
            .dry_run(true)
            .run(&target, &sink, &CancelToken::new())
            .expect("Run failed");

        assert!(!target.exists());
        assert!(summary.journal_path.is_none());
        assert_eq!(summary.placements.len(), 1);
        assert!(summary.placements[0].destination.ends_with("audio/mp3/song.mp3"));
        assert_eq!(summary.placements[0].state, PlacementState::Previewed);
        assert!(
            events
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, Event::Previewed { .. }))
        );
    }

    #[test]
    fn test_cancelled_run_places_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("inbox");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("a.txt"), "a").unwrap();
        fs::write(source.join("b.txt"), "b").unwrap();
        let target = temp_dir.path().join("sorted");

        let cancel = CancelToken::new();
        cancel.cancel();
        let summary = Organizer::new(&source, Config::default())
            .run(&target, &SilentSink, &cancel)
            .expect("Run failed");

        assert!(summary.cancelled);
        assert!(summary.placements.is_empty());
        assert_eq!(summary.statistics.copied, 0);
        let journal = Journal::load(summary.journal_path.as_deref().unwrap()).unwrap();
        assert!(journal.records().is_empty());
    }

    #[test]
    fn test_invalid_category_config_aborts_before_scanning() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = Config::from_toml("[categories.other]\nextensions = [\"x\"]\n").unwrap();

        let result = Organizer::new(temp_dir.path(), config).survey(&SilentSink);

        assert!(matches!(result, Err(RunError::Config(ConfigError::Categories(_)))));
    }

    #[test]
    fn test_invalid_category_config_leaves_target_untouched() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source = temp_dir.path().join("inbox");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("a.txt"), "a").unwrap();
        let target = temp_dir.path().join("sorted");
        let config = Config::from_toml("[categories.other]\nextensions = [\"x\"]\n").unwrap();

        let result = Organizer::new(&source, config).run(&target, &SilentSink, &CancelToken::new());

        assert!(matches!(result, Err(RunError::Config(ConfigError::Categories(_)))));
        assert!(!target.exists());
    }

    #[test]
    fn test_record_skip_appends_failed_skip() {
        let mut journal = Journal::in_memory(Path::new("/src"), Path::new("/dst"));

        let seq = FileOrganizer::record_skip(
            &mut journal,
            Path::new("/src/a.txt"),
            Path::new("/dst/documents/txt/a.txt"),
            "documents",
        )
        .expect("Journal failed");

        let record = journal.get(seq).unwrap();
        assert_eq!(record.action, ActionKind::Skip);
        assert_eq!(record.status, Status::Failed);
        assert_eq!(record.category.as_deref(), Some("documents"));
        assert_eq!(record.destination, PathBuf::from("/dst/documents/txt/a.txt"));
        assert!(!record.is_completed_copy());
    }
}
