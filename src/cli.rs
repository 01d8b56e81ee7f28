//! Command-line interface module for dirsort.
//!
//! This module handles all CLI-related functionality:
//! - Argument parsing (`clap` derive)
//! - Merging command-line flags over the loaded configuration
//! - Dispatching to the organize, undo, duplicates, stats and history commands

use crate::config::Config;
use crate::duplicates::HashAlgorithm;
use crate::events::CancelToken;
use crate::file_organizer::Organizer;
use crate::journal::Journal;
use crate::output::{OutputFormatter, ProgressSink};
use crate::placement::Strategy;
use crate::statistics::RunStatistics;
use crate::undo::UndoManager;
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Sort files into a categorized target tree, find duplicates, undo runs.
#[derive(Debug, Parser)]
#[command(name = "dirsort", version, about)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (default: ./.dirsortrc.toml, then ~/.config/dirsort/config.toml).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Copy files from SOURCE into a categorized tree under TARGET.
    Organize(OrganizeArgs),
    /// Revert the latest run into TARGET (or the given journal).
    Undo {
        target: PathBuf,
        /// Journal file to revert instead of the latest one.
        #[arg(long, value_name = "FILE")]
        journal: Option<PathBuf>,
    },
    /// List groups of byte-identical files under SOURCE.
    Duplicates {
        source: PathBuf,
        /// Hash algorithm: sha256, blake3 or xxh64.
        #[arg(long)]
        algorithm: Option<HashAlgorithm>,
        #[arg(long)]
        no_recursive: bool,
    },
    /// Show category and extension statistics for SOURCE.
    Stats {
        source: PathBuf,
        #[arg(long)]
        no_recursive: bool,
    },
    /// List the runs recorded for TARGET.
    History { target: PathBuf },
}

#[derive(Debug, Clone, Args)]
pub struct OrganizeArgs {
    pub source: PathBuf,
    pub target: PathBuf,
    /// Show where files would go without copying anything.
    #[arg(long)]
    pub dry_run: bool,
    /// Layout of the target tree: category or date.
    #[arg(long)]
    pub strategy: Option<Strategy>,
    /// Only organize the top level of SOURCE.
    #[arg(long)]
    pub no_recursive: bool,
    /// Also report duplicate files.
    #[arg(long)]
    pub find_duplicates: bool,
    /// Skip files smaller than this many bytes.
    #[arg(long, value_name = "BYTES")]
    pub min_size: Option<u64>,
    /// Skip files larger than this many bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_size: Option<u64>,
    /// Skip files last modified before this day (YYYY-MM-DD).
    #[arg(long, value_name = "DATE")]
    pub modified_after: Option<NaiveDate>,
    /// Skip files last modified after this day (YYYY-MM-DD).
    #[arg(long, value_name = "DATE")]
    pub modified_before: Option<NaiveDate>,
    /// Skip files with this extension (repeatable).
    #[arg(long = "exclude-ext", value_name = "EXT")]
    pub exclude_ext: Vec<String>,
}

impl OrganizeArgs {
    /// Applies the flags over `config`. Flags win over configuration values.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(strategy) = self.strategy {
            config.organize.strategy = strategy;
        }
        if self.no_recursive {
            config.organize.recursive = false;
        }
        if self.find_duplicates {
            config.duplicates.enabled = true;
        }
        if self.min_size.is_some() {
            config.filters.min_size = self.min_size;
        }
        if self.max_size.is_some() {
            config.filters.max_size = self.max_size;
        }
        if self.modified_after.is_some() {
            config.filters.min_modified = self.modified_after;
        }
        if self.modified_before.is_some() {
            config.filters.max_modified = self.modified_before;
        }
        config
            .filters
            .exclude
            .extensions
            .extend(self.exclude_ext.iter().cloned());
    }
}

/// Runs the parsed command line.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use dirsort::cli::{Cli, run_cli};
///
/// let cli = Cli::parse_from(["dirsort", "organize", "--dry-run", "inbox", "sorted"]);
/// if let Err(e) = run_cli(cli) {
///     eprintln!("Error: {}", e);
/// }
/// ```
pub fn run_cli(cli: Cli) -> Result<(), String> {
    let mut config = Config::load(cli.config.as_deref())
        .map_err(|e| format!("Error loading configuration: {}", e))?;
    let verbose = cli.verbose > 0;

    match cli.command {
        Command::Organize(args) => {
            args.apply_to(&mut config);
            config
                .validate()
                .map_err(|e| format!("Invalid options: {}", e))?;
            organize(&args, config, verbose)
        }
        Command::Undo { target, journal } => undo(&target, journal.as_deref(), &config),
        Command::Duplicates {
            source,
            algorithm,
            no_recursive,
        } => {
            config.duplicates.enabled = true;
            if let Some(algorithm) = algorithm {
                config.duplicates.algorithm = algorithm;
            }
            config.organize.recursive &= !no_recursive;
            duplicates(&source, config, verbose)
        }
        Command::Stats {
            source,
            no_recursive,
        } => {
            config.organize.recursive &= !no_recursive;
            stats(&source, config, verbose)
        }
        Command::History { target } => history(&target, &config),
    }
}

fn organize(args: &OrganizeArgs, config: Config, verbose: bool) -> Result<(), String> {
    OutputFormatter::info(&format!(
        "Organizing {} into {}",
        args.source.display(),
        args.target.display()
    ));
    if args.dry_run {
        OutputFormatter::dry_run_notice("No files will be copied");
    }

    let sink = ProgressSink::new(verbose);
    let summary = Organizer::new(&args.source, config)
        .dry_run(args.dry_run)
        .run(&args.target, &sink, &CancelToken::new())
        .map_err(|e| format!("Organization failed: {}", e))?;

    if let Some(report) = &summary.survey.duplicates {
        OutputFormatter::duplicates_report(report);
    }
    OutputFormatter::issues(summary.issues());
    OutputFormatter::summary_table(&summary.statistics);

    if summary.dry_run {
        OutputFormatter::dry_run_notice(&format!(
            "{} files would be copied",
            summary.placements.len()
        ));
    } else if let Some(path) = &summary.journal_path {
        OutputFormatter::success(&format!(
            "Copied {} files. Undo with: dirsort undo {}",
            summary.statistics.copied,
            args.target.display()
        ));
        OutputFormatter::info(&format!("Journal: {}", path.display()));
    }
    if summary.cancelled {
        OutputFormatter::warning("Run was cancelled before all files were placed");
    }
    Ok(())
}

fn undo(target: &Path, journal_path: Option<&Path>, config: &Config) -> Result<(), String> {
    let mut journal = match journal_path {
        Some(path) => Journal::load(path),
        None => Journal::latest(&config.organize.journal_dir_for(target)),
    }
    .map_err(|e| format!("No run to undo: {}", e))?;

    OutputFormatter::info(&format!(
        "Undoing run {} ({} -> {})",
        journal.run_id,
        journal.source_root.display(),
        journal.target_root.display()
    ));
    let report =
        UndoManager::undo(&mut journal).map_err(|e| format!("Undo failed: {}", e))?;
    OutputFormatter::undo_report(&report);

    if report.is_complete_success() {
        Ok(())
    } else {
        Err(format!("{} copies could not be removed", report.failed.len()))
    }
}

fn duplicates(source: &Path, config: Config, verbose: bool) -> Result<(), String> {
    let sink = ProgressSink::new(verbose);
    let survey = Organizer::new(source, config)
        .survey(&sink)
        .map_err(|e| format!("Scan failed: {}", e))?;

    OutputFormatter::issues(&survey.issues);
    if let Some(report) = &survey.duplicates {
        OutputFormatter::duplicates_report(report);
    }
    Ok(())
}

fn stats(source: &Path, config: Config, verbose: bool) -> Result<(), String> {
    let sink = ProgressSink::new(verbose);
    let survey = Organizer::new(source, config)
        .survey(&sink)
        .map_err(|e| format!("Scan failed: {}", e))?;

    OutputFormatter::issues(&survey.issues);
    OutputFormatter::statistics_report(&RunStatistics::from_run(&survey.results, &[]));
    Ok(())
}

fn history(target: &Path, config: &Config) -> Result<(), String> {
    let dir = config.organize.journal_dir_for(target);
    let paths = Journal::list(&dir).map_err(|e| format!("Cannot read history: {}", e))?;

    let journals: Vec<Journal> = paths
        .iter()
        .filter_map(|path| match Journal::load(path) {
            Ok(journal) => Some(journal),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable journal");
                None
            }
        })
        .collect();

    OutputFormatter::history(&journals);
    Ok(())
}
