//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output: colored messages, the
//! progress bar fed by run events, and the summary tables.

use crate::duplicates::DuplicateReport;
use crate::events::{Event, EventSink};
use crate::file_organizer::Issue;
use crate::journal::Journal;
use crate::statistics::RunStatistics;
use crate::undo::UndoReport;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

/// Manages all CLI output with consistent styling and formatting.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dirsort::output::OutputFormatter;
    /// OutputFormatter::success("Copied 12 files");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Creates a progress bar for file operations.
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Prints the per-category table and the run totals.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dirsort::output::OutputFormatter;
    /// use dirsort::statistics::RunStatistics;
    ///
    /// OutputFormatter::summary_table(&RunStatistics::from_run(&[], &[]));
    /// ```
    pub fn summary_table(stats: &RunStatistics) {
        Self::header("SUMMARY");

        let width = stats
            .categories
            .keys()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max(8);

        println!(
            "{:<width$} | {:>6} | {}",
            "Category".bold(),
            "Files".bold(),
            "Size".bold(),
            width = width
        );
        println!("{}", "-".repeat(width + 24));
        for (category, bucket) in &stats.categories {
            println!(
                "{:<width$} | {:>6} | {}",
                category,
                bucket.count.to_string().green(),
                format_size(bucket.bytes),
                width = width
            );
        }
        println!("{}", "-".repeat(width + 24));
        println!(
            "{:<width$} | {:>6} | {}",
            "Total".bold(),
            stats.total_files.to_string().green().bold(),
            format_size(stats.total_bytes),
            width = width
        );

        if stats.copied + stats.failed + stats.skipped > 0 {
            println!(
                "\nCopied {}, failed {}, skipped {} ({:.1}% success)",
                stats.copied.to_string().green(),
                stats.failed.to_string().red(),
                stats.skipped.to_string().yellow(),
                stats.success_rate()
            );
        }
    }

    /// Prints the detailed report used by the `stats` command.
    pub fn statistics_report(stats: &RunStatistics) {
        Self::summary_table(stats);

        Self::header("Top extensions");
        for (ext, bucket) in stats.top_extensions(10) {
            println!("  {:<12} {:>6} files  {}", ext, bucket.count, format_size(bucket.bytes));
        }

        println!("\nAverage size: {}", format_size(stats.average_size() as u64));
        if let Some(range) = stats.date_range {
            println!(
                "Modified between {} and {} ({} days)",
                range.oldest.format("%Y-%m-%d"),
                range.newest.format("%Y-%m-%d"),
                range.span_days()
            );
        }
    }

    /// Prints every duplicate group with its members.
    pub fn duplicates_report(report: &DuplicateReport) {
        if report.groups.is_empty() {
            Self::success("No duplicate files found");
            return;
        }

        Self::header("DUPLICATES");
        for group in &report.groups {
            println!(
                "{} {} x{} ({} wasted)",
                &group.hash[..group.hash.len().min(12)].dimmed(),
                format_size(group.size),
                group.members.len(),
                format_size(group.wasted_space()).yellow()
            );
            for member in &group.members {
                println!("    {}", member.relative_path.display());
            }
        }
        println!(
            "\n{} groups, {} redundant files, {} reclaimable",
            report.groups.len(),
            report.duplicate_file_count(),
            format_size(report.total_wasted_space()).bold()
        );
    }

    /// Prints per-file problems of a run.
    pub fn issues(issues: &[Issue]) {
        if issues.is_empty() {
            return;
        }
        Self::header("ISSUES");
        for issue in issues {
            println!("  {} {}", "✗".red(), issue);
        }
    }

    /// Prints what an undo did.
    pub fn undo_report(report: &UndoReport) {
        Self::success(&format!(
            "Removed {} copies and {} directories",
            report.reverted, report.dirs_removed
        ));
        if report.already_absent > 0 {
            Self::warning(&format!(
                "{} copies were already gone",
                report.already_absent
            ));
        }
        for (path, reason) in &report.failed {
            Self::error(&format!("{}: {}", path.display(), reason));
        }
    }

    /// Prints one line per journal.
    pub fn history(journals: &[Journal]) {
        if journals.is_empty() {
            Self::info("No runs recorded");
            return;
        }
        Self::header("HISTORY");
        for journal in journals {
            let copies = journal
                .records()
                .iter()
                .filter(|r| r.is_completed_copy())
                .count();
            println!(
                "{}  {}  {} copies  from {}",
                journal.run_id.bold(),
                journal.started_at.format("%Y-%m-%d %H:%M:%S"),
                copies,
                journal.source_root.display()
            );
        }
    }
}

/// Human-readable byte count using binary units.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Renders run events on the terminal: a progress bar over the placement
/// phase, with problems (and, when verbose, every placement) printed above it.
pub struct ProgressSink {
    bar: ProgressBar,
    verbose: bool,
}

impl ProgressSink {
    pub fn new(verbose: bool) -> Self {
        Self {
            bar: OutputFormatter::create_progress_bar(0),
            verbose,
        }
    }
}

impl EventSink for ProgressSink {
    fn emit(&self, event: &Event) {
        match event {
            Event::ScanStarted { root } => {
                self.bar.set_message(format!("scanning {}", root.display()));
            }
            Event::FileUnreadable { path, reason } | Event::HashFailed { path, reason } => {
                self.bar
                    .println(format!("{} {}: {}", "⚠".yellow(), path.display(), reason));
            }
            Event::ScanFinished { files, filtered_out } => {
                self.bar.println(format!(
                    "Found {} files ({} filtered out)",
                    files, filtered_out
                ));
            }
            Event::Categorized { .. } => {}
            Event::DuplicatesFound {
                groups,
                wasted_bytes,
            } => {
                self.bar.println(format!(
                    "{} duplicate groups, {} reclaimable",
                    groups,
                    format_size(*wasted_bytes)
                ));
            }
            Event::PlacementStarted { total, dry_run } => {
                self.bar.set_length(*total as u64);
                self.bar.set_position(0);
                self.bar
                    .set_message(if *dry_run { "previewing" } else { "copying" });
            }
            Event::Previewed {
                source,
                destination,
            } => {
                self.bar.println(format!(
                    "{} {} -> {}",
                    "[DRY RUN]".yellow(),
                    source.display(),
                    destination.display()
                ));
                self.bar.inc(1);
            }
            Event::Copied {
                source,
                destination,
            } => {
                if self.verbose {
                    self.bar.println(format!(
                        "{} {} -> {}",
                        "✓".green(),
                        source.display(),
                        destination.display()
                    ));
                }
                self.bar.inc(1);
            }
            Event::PlacementFailed { source, reason } => {
                self.bar
                    .println(format!("{} {}: {}", "✗".red(), source.display(), reason));
                self.bar.inc(1);
            }
            Event::Cancelled { remaining } => {
                self.bar.println(format!(
                    "{} cancelled, {} files left untouched",
                    "⚠".yellow(),
                    remaining
                ));
            }
            Event::RunFinished { .. } => self.bar.finish_and_clear(),
        }
    }
}
