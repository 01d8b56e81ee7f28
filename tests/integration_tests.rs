//! Integration tests for dirsort
//!
//! These tests run the complete pipeline against real temporary directory
//! trees: scan, categorize, find duplicates, copy into the target tree and undo.
//!
//! Test categories:
//! 1. Categorization outcomes
//! 2. Duplicate detection
//! 3. Placement and conflict resolution
//! 4. Journal and undo
//! 5. Filtering and layout options
use approx::assert_relative_eq;
use dirsort::file_category::OTHER_CATEGORY;
use dirsort::file_organizer::IssueKind;
use dirsort::journal::{ActionKind, JOURNAL_DIR_NAME, Journal, JournalError, Status};
use dirsort::placement::{MAX_CONFLICT_ATTEMPTS, PlacementState};
use dirsort::{
    CancelToken, Config, Event, Organizer, RunError, RunSummary, SilentSink, Survey, UndoManager,
};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use walkdir::WalkDir;

// ============================================================================
// Test Utilities
// ============================================================================

/// A temporary workspace with a `source` tree and a `target` root next to it.
struct TestFixture {
    _temp_dir: TempDir,
    root: PathBuf,
}

impl TestFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = fs::canonicalize(temp_dir.path()).expect("Failed to resolve temp directory");
        fs::create_dir(root.join("source")).expect("Failed to create source directory");
        TestFixture {
            _temp_dir: temp_dir,
            root,
        }
    }

    fn source(&self) -> PathBuf {
        self.root.join("source")
    }

    fn target(&self) -> PathBuf {
        self.root.join("target")
    }

    fn journal_dir(&self) -> PathBuf {
        self.target().join(JOURNAL_DIR_NAME)
    }

    /// Create a file below the source root, creating parent directories.
    fn create_file(&self, rel_path: &str, content: &[u8]) -> PathBuf {
        let path = self.source().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&path, content).expect("Failed to write file content");
        path
    }

    fn create_text_file(&self, rel_path: &str, content: &str) -> PathBuf {
        self.create_file(rel_path, content.as_bytes())
    }

    fn organize(&self, config: Config) -> RunSummary {
        Organizer::new(&self.source(), config)
            .run(&self.target(), &SilentSink, &CancelToken::new())
            .expect("Organize run failed")
    }

    fn survey(&self, config: Config) -> Survey {
        Organizer::new(&self.source(), config)
            .survey(&SilentSink)
            .expect("Survey failed")
    }

    /// Files below the target root, relative to it, excluding the journal directory.
    fn target_files(&self) -> Vec<PathBuf> {
        let target = self.target();
        if !target.exists() {
            return Vec::new();
        }
        let mut files: Vec<PathBuf> = WalkDir::new(&target)
            .into_iter()
            .filter_entry(|e| e.file_name() != JOURNAL_DIR_NAME)
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().strip_prefix(&target).unwrap().to_path_buf())
            .collect();
        files.sort();
        files
    }

    /// Path and content of every file in the source tree.
    fn source_snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        WalkDir::new(self.source())
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let content = fs::read(e.path()).expect("Failed to read source file");
                (e.path().to_path_buf(), content)
            })
            .collect()
    }

    fn assert_target_file(&self, rel_path: &str, expected: &str) {
        let path = self.target().join(rel_path);
        let content = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("File should exist: {} ({})", path.display(), e));
        assert_eq!(content, expected, "unexpected content in {}", path.display());
    }
}

fn config(toml: &str) -> Config {
    Config::from_toml(toml).expect("Failed to parse test configuration")
}

fn flat_config() -> Config {
    config("[organize]\npreserve_structure = false\n")
}

// ============================================================================
// Categorization
// ============================================================================

#[test]
fn test_extension_only_match_scores_point_four() {
    let fixture = TestFixture::new();
    fixture.create_text_file("report.pdf", "not really a pdf");

    let survey = fixture.survey(config(
        r#"
        [categories.documents]
        extensions = [".pdf"]
        "#,
    ));

    assert_eq!(survey.results.len(), 1);
    assert_eq!(survey.results[0].category, "documents");
    assert_relative_eq!(survey.results[0].confidence, 0.4);
}

#[test]
fn test_unmatched_file_goes_to_other() {
    let fixture = TestFixture::new();
    fixture.create_file("blob.zzz", &[0u8, 1, 2, 3]);

    let summary = fixture.organize(Config::default());

    let result = &summary.survey.results[0];
    assert_eq!(result.category, OTHER_CATEGORY);
    assert_relative_eq!(result.confidence, 0.0);
    fixture.assert_target_file("other/other/blob.zzz", "\u{0}\u{1}\u{2}\u{3}");
}

#[test]
fn test_content_sniffing_beats_missing_extension() {
    let fixture = TestFixture::new();
    let png_header = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    fixture.create_file("scan", &png_header);

    let survey = fixture.survey(Config::default());

    assert_eq!(survey.results[0].category, "images");
    assert_relative_eq!(survey.results[0].confidence, 0.3);
}

#[test]
fn test_keyword_content_can_exceed_one() {
    let fixture = TestFixture::new();
    fixture.create_text_file(
        "invoice-2024.txt",
        "Invoice total, payment due, invoice number, vat, amount",
    );

    let survey = fixture.survey(config(
        r#"
        [categories.finance]
        extensions = [".txt"]
        keywords = ["invoice", "payment", "vat", "amount", "total"]
        mime_types = ["text/plain"]
        "#,
    ));

    let result = &survey.results[0];
    assert_eq!(result.category, "finance");
    // extension 0.4 + MIME 0.3 + filename 0.2 + five content hits 0.5
    assert_relative_eq!(result.confidence, 1.4);
}

// ============================================================================
// Duplicates
// ============================================================================

#[test]
fn test_identical_files_form_one_group() {
    let fixture = TestFixture::new();
    fixture.create_text_file("a.txt", "same bytes\n");
    fixture.create_text_file("b.txt", "same bytes\n");
    fixture.create_text_file("c.txt", "diff bytes\n");
    fixture.create_text_file("d.txt", "unique");

    let mut config = Config::default();
    config.duplicates.enabled = true;
    let survey = fixture.survey(config);

    let report = survey.duplicates.expect("duplicate report missing");
    assert_eq!(report.groups.len(), 1);
    let group = &report.groups[0];
    assert_eq!(group.members.len(), 2);
    assert_eq!(group.members[0].name, "a.txt");
    assert_eq!(group.members[1].name, "b.txt");
    assert_eq!(group.wasted_space(), 11);
    assert_eq!(report.total_wasted_space(), 11);
}

#[test]
fn test_duplicates_never_group_different_sizes() {
    let fixture = TestFixture::new();
    fixture.create_text_file("one.txt", "abc");
    fixture.create_text_file("two.txt", "abcd");

    let mut config = Config::default();
    config.duplicates.enabled = true;
    let survey = fixture.survey(config);

    let report = survey.duplicates.unwrap();
    assert!(report.groups.is_empty());
    assert_eq!(report.hashed_files, 0);
}

// ============================================================================
// Placement
// ============================================================================

#[test]
fn test_same_destination_gets_numeric_suffix() {
    let fixture = TestFixture::new();
    fixture.create_text_file("x/report.pdf", "first");
    fixture.create_text_file("y/report.pdf", "second");

    let summary = fixture.organize(flat_config());

    assert_eq!(summary.statistics.copied, 2);
    fixture.assert_target_file("documents/pdf/report.pdf", "first");
    fixture.assert_target_file("documents/pdf/report_1.pdf", "second");
}

#[test]
fn test_many_identical_names_all_get_distinct_destinations() {
    let fixture = TestFixture::new();
    for i in 0..12 {
        fixture.create_text_file(&format!("dir{:02}/notes.txt", i), &format!("note {}", i));
    }

    let summary = fixture.organize(flat_config());

    assert_eq!(summary.statistics.copied, 12);
    let files = fixture.target_files();
    assert_eq!(files.len(), 12);
    assert!(files.iter().all(|f| f.starts_with("documents/txt")));
}

#[test]
fn test_structure_preserved_by_default() {
    let fixture = TestFixture::new();
    fixture.create_text_file("work/2024/summary.txt", "q1");
    fixture.create_text_file("main.rs", "fn main() {}");

    fixture.organize(Config::default());

    fixture.assert_target_file("work/2024/documents/txt/summary.txt", "q1");
    fixture.assert_target_file("code/rust/main.rs", "fn main() {}");
}

#[test]
fn test_date_strategy_uses_modification_month() {
    let fixture = TestFixture::new();
    let path = fixture.create_text_file("photo.jpg", "jpeg-ish");
    // 2023-05-15 12:00 UTC: the same month in every time zone.
    let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_684_152_000);
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(mtime)
        .unwrap();

    fixture.organize(config("[organize]\nstrategy = \"date\"\n"));

    fixture.assert_target_file("2023-05/photo.jpg", "jpeg-ish");
    let copied = fs::metadata(fixture.target().join("2023-05/photo.jpg")).unwrap();
    assert_eq!(copied.modified().unwrap(), mtime);
}

#[test]
fn test_second_run_never_overwrites_first() {
    let fixture = TestFixture::new();
    fixture.create_text_file("letter.txt", "v1");
    fixture.organize(Config::default());

    fs::write(fixture.source().join("letter.txt"), "v2").unwrap();
    fixture.organize(Config::default());

    fixture.assert_target_file("documents/txt/letter.txt", "v1");
    fixture.assert_target_file("documents/txt/letter_1.txt", "v2");
}

#[test]
fn test_target_inside_source_is_not_rescanned() {
    let fixture = TestFixture::new();
    fixture.create_text_file("a.txt", "a");
    fixture.create_text_file("b.txt", "b");
    let nested_target = fixture.source().join("sorted");

    for _ in 0..2 {
        let summary = Organizer::new(&fixture.source(), Config::default())
            .run(&nested_target, &SilentSink, &CancelToken::new())
            .expect("Organize run failed");
        assert_eq!(summary.survey.results.len(), 2);
    }

    assert!(nested_target.join("documents/txt/a_1.txt").exists());
    assert!(!nested_target.join("sorted").exists());
}

#[test]
fn test_target_containing_source_still_organizes() {
    let fixture = TestFixture::new();
    fixture.create_text_file("report.pdf", "quarterly");

    for expected in ["documents/pdf/report.pdf", "documents/pdf/report_1.pdf"] {
        let summary = Organizer::new(&fixture.source(), Config::default())
            .run(&fixture.root, &SilentSink, &CancelToken::new())
            .expect("Organize run failed");
        assert_eq!(summary.survey.results.len(), 1);
        assert_eq!(summary.statistics.copied, 1);
        assert!(fixture.root.join(expected).exists());
    }

    assert!(fixture.source().join("report.pdf").exists());
}

#[test]
fn test_exhausted_conflicts_skip_the_file() {
    let fixture = TestFixture::new();
    fixture.create_text_file("a.txt", "new");
    let taken = fixture.target().join("documents/txt");
    fs::create_dir_all(&taken).unwrap();
    fs::write(taken.join("a.txt"), "old").unwrap();
    for n in 1..=MAX_CONFLICT_ATTEMPTS {
        fs::write(taken.join(format!("a_{}.txt", n)), "old").unwrap();
    }

    let summary = fixture.organize(Config::default());

    assert_eq!(summary.statistics.copied, 0);
    assert_eq!(summary.statistics.skipped, 1);
    assert!(summary.placements.is_empty());
    assert_eq!(summary.issues().len(), 1);
    assert_eq!(summary.issues()[0].kind, IssueKind::ConflictResolutionExhausted);
    assert_eq!(summary.issues()[0].path, fixture.source().join("a.txt"));

    let journal = Journal::load(summary.journal_path.as_deref().unwrap()).unwrap();
    assert_eq!(journal.records().len(), 1);
    let record = &journal.records()[0];
    assert_eq!((record.action, record.status), (ActionKind::Skip, Status::Failed));
    assert_eq!(record.destination, taken.join("a.txt"));
    fixture.assert_target_file("documents/txt/a.txt", "old");
}

#[test]
fn test_invalid_config_leaves_target_untouched() {
    let fixture = TestFixture::new();
    fixture.create_text_file("a.txt", "a");

    let invalid = config("[categories.other]\nextensions = [\"x\"]\n");

    let result =
        Organizer::new(&fixture.source(), invalid).run(&fixture.target(), &SilentSink, &CancelToken::new());

    assert!(matches!(result, Err(RunError::Config(_))));
    assert!(!fixture.target().exists());
}

#[test]
fn test_source_tree_is_untouched() {
    let fixture = TestFixture::new();
    fixture.create_text_file("a.txt", "alpha");
    fixture.create_text_file("img/b.png", "beta");
    fixture.create_file("deep/er/c.bin", &[9, 9, 9]);
    let before = fixture.source_snapshot();

    let summary = fixture.organize(Config::default());

    assert_eq!(summary.statistics.copied, 3);
    assert!(summary.placements.iter().all(|p| p.state == PlacementState::Done));
    assert_eq!(fixture.source_snapshot(), before);
}

#[test]
fn test_every_file_is_accounted_for() {
    let fixture = TestFixture::new();
    for name in ["a.pdf", "b.png", "c.mp3", "d.zip", "e", "f.csv", "g.pptx"] {
        fixture.create_text_file(name, name);
    }

    let summary = fixture.organize(Config::default());
    let stats = &summary.statistics;

    assert_eq!(stats.total_files, 7);
    assert_eq!(stats.copied + stats.failed + stats.skipped, 7);
    assert_eq!(fixture.target_files().len(), 7);
}

#[test]
fn test_dry_run_creates_nothing() {
    let fixture = TestFixture::new();
    fixture.create_text_file("a.txt", "a");
    fixture.create_text_file("b.pdf", "b");

    let summary = Organizer::new(&fixture.source(), Config::default())
        .dry_run(true)
        .run(&fixture.target(), &SilentSink, &CancelToken::new())
        .expect("Dry run failed");

    assert_eq!(summary.placements.len(), 2);
    assert!(summary.journal_path.is_none());
    assert!(!fixture.target().exists());
}

// ============================================================================
// Journal and undo
// ============================================================================

#[test]
fn test_organize_then_undo_restores_target() {
    let fixture = TestFixture::new();
    fixture.create_text_file("a.pdf", "a");
    fixture.create_text_file("b.png", "b");
    fixture.create_text_file("nested/c.txt", "c");

    let summary = fixture.organize(Config::default());
    assert_eq!(fixture.target_files().len(), 3);

    let mut journal = Journal::load(summary.journal_path.as_deref().unwrap()).unwrap();
    let report = UndoManager::undo(&mut journal).expect("Undo failed");

    assert_eq!(report.reverted, 3);
    assert!(report.is_complete_success());
    assert!(fixture.target_files().is_empty());

    let reloaded = Journal::latest(&fixture.journal_dir()).unwrap();
    let undone = reloaded
        .records()
        .iter()
        .filter(|r| r.status == Status::Undone)
        .count();
    let undo_records = reloaded
        .records()
        .iter()
        .filter(|r| r.action == ActionKind::Undo)
        .count();
    assert_eq!(undone, 3);
    assert_eq!(undo_records, 3);

    // Only the journal directory is left in the target.
    let remaining: Vec<_> = fs::read_dir(fixture.target())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(remaining, vec![JOURNAL_DIR_NAME]);
}

#[test]
fn test_undo_only_reverts_latest_run() {
    let fixture = TestFixture::new();
    fixture.create_text_file("first.txt", "1");
    fixture.organize(Config::default());

    fs::remove_file(fixture.source().join("first.txt")).unwrap();
    fixture.create_text_file("second.txt", "2");
    fixture.organize(Config::default());

    let mut journal = Journal::latest(&fixture.journal_dir()).unwrap();
    UndoManager::undo(&mut journal).unwrap();

    assert_eq!(
        fixture.target_files(),
        vec![PathBuf::from("documents/txt/first.txt")]
    );
}

#[test]
fn test_journal_reloads_after_restart() {
    let fixture = TestFixture::new();
    fixture.create_text_file("a.pdf", "a");
    fixture.create_text_file("b.pdf", "b");

    let summary = fixture.organize(Config::default());

    let history = Journal::list(&fixture.journal_dir()).unwrap();
    assert_eq!(history.len(), 1);
    let journal = Journal::load(&history[0]).unwrap();
    assert_eq!(Some(journal.run_id.clone()), summary.run_id);
    assert_eq!(journal.source_root, fixture.source());
    assert!(journal.records().iter().all(|r| r.is_completed_copy()));
    assert!(
        journal
            .records()
            .iter()
            .all(|r| r.category.as_deref() == Some("documents"))
    );

    let remote: Vec<String> = journal.upload_pairs().into_iter().map(|(_, r)| r).collect();
    assert_eq!(remote, vec!["documents/pdf/a.pdf", "documents/pdf/b.pdf"]);
}

#[test]
fn test_journal_failure_aborts_and_leaves_undoable_journal() {
    let fixture = TestFixture::new();
    for name in ["a.txt", "b.txt", "c.txt"] {
        fixture.create_text_file(name, name);
    }
    let moved = fixture.root.join("journal-moved");
    let sink = |event: &Event| {
        if matches!(event, Event::Copied { .. }) {
            let _ = fs::rename(fixture.journal_dir(), &moved);
        }
    };

    let result = Organizer::new(&fixture.source(), Config::default())
        .run(&fixture.target(), &sink, &CancelToken::new());

    assert!(matches!(result, Err(RunError::Journal(JournalError::WriteFailed { .. }))));
    assert_eq!(fixture.target_files(), vec![PathBuf::from("documents/txt/a.txt")]);

    let history = Journal::list(&moved).unwrap();
    assert_eq!(history.len(), 1);
    let mut journal = Journal::load(&history[0]).unwrap();
    assert_eq!(journal.records().len(), 1);
    assert!(journal.records()[0].is_completed_copy());

    let report = UndoManager::undo(&mut journal).expect("Undo failed");
    assert_eq!(report.reverted, 1);
    assert!(fixture.target_files().is_empty());
}

#[test]
fn test_undo_after_user_deleted_a_copy() {
    let fixture = TestFixture::new();
    fixture.create_text_file("a.txt", "a");
    fixture.create_text_file("b.txt", "b");
    fixture.organize(Config::default());
    fs::remove_file(fixture.target().join("documents/txt/a.txt")).unwrap();

    let mut journal = Journal::latest(&fixture.journal_dir()).unwrap();
    let report = UndoManager::undo(&mut journal).unwrap();

    assert_eq!(report.reverted, 1);
    assert_eq!(report.already_absent, 1);
    assert!(fixture.target_files().is_empty());
}

// ============================================================================
// Filtering
// ============================================================================

#[test]
fn test_filters_limit_what_is_organized() {
    let fixture = TestFixture::new();
    fixture.create_text_file("keep.txt", "keep this");
    fixture.create_text_file("tiny.txt", "x");
    fixture.create_text_file("old.bak", "backup file");
    fixture.create_text_file(".hidden.txt", "hidden file");
    fixture.create_text_file("node_modules/pkg/index.js", "module.exports = 1");

    let summary = fixture.organize(config(
        r#"
        [filters]
        min_size = 2

        [filters.exclude]
        extensions = ["bak"]
        patterns = ["node_modules/**"]
        "#,
    ));

    assert_eq!(summary.survey.filtered_out, 4);
    assert_eq!(
        fixture.target_files(),
        vec![PathBuf::from("documents/txt/keep.txt")]
    );
}

#[test]
fn test_non_recursive_scan_skips_subdirectories() {
    let fixture = TestFixture::new();
    fixture.create_text_file("top.txt", "top");
    fixture.create_text_file("sub/inner.txt", "inner");

    let summary = fixture.organize(config("[organize]\nrecursive = false\n"));

    assert_eq!(summary.survey.results.len(), 1);
    assert_eq!(
        fixture.target_files(),
        vec![PathBuf::from("documents/txt/top.txt")]
    );
}

#[test]
fn test_missing_source_is_fatal() {
    let fixture = TestFixture::new();
    let result = Organizer::new(&fixture.root.join("nope"), Config::default()).run(
        &fixture.target(),
        &SilentSink,
        &CancelToken::new(),
    );

    assert!(result.is_err());
    assert!(!fixture.target().exists());
}

#[test]
fn test_results_are_deterministic() {
    let fixture = TestFixture::new();
    for name in ["z.txt", "a.png", "m/n.pdf", "m/a.mp3", "k.rs"] {
        fixture.create_text_file(name, name);
    }

    let first = fixture.survey(Config::default());
    let second = fixture.survey(Config::default());

    let summarize = |survey: &Survey| -> Vec<(PathBuf, String)> {
        survey
            .results
            .iter()
            .map(|r| (r.record.relative_path.clone(), r.category.clone()))
            .collect()
    };
    assert_eq!(summarize(&first), summarize(&second));
    assert_eq!(first.results[0].record.relative_path, Path::new("a.png"));
}
