//! Run statistics.
//!
//! A pure reduction over categorization results and journal records; it never
//! touches the filesystem.

use crate::file_category::CategorizationResult;
use crate::journal::{ActionKind, OperationRecord, Status};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;

/// Key used for files without an extension.
pub const NO_EXTENSION: &str = "(none)";

/// File count and total size of one group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bucket {
    pub count: usize,
    pub bytes: u64,
}

impl Bucket {
    fn add(&mut self, bytes: u64) {
        self.count += 1;
        self.bytes += bytes;
    }
}

/// Oldest and newest modification time seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub oldest: DateTime<Local>,
    pub newest: DateTime<Local>,
}

impl DateRange {
    pub fn span_days(&self) -> i64 {
        (self.newest - self.oldest).num_days()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStatistics {
    pub total_files: usize,
    pub total_bytes: u64,
    pub categories: BTreeMap<String, Bucket>,
    pub extensions: BTreeMap<String, Bucket>,
    pub date_range: Option<DateRange>,
    pub copied: usize,
    pub failed: usize,
    pub skipped: usize,
    pub undone: usize,
    /// Announced but never settled.
    pub pending: usize,
}

impl RunStatistics {
    /// Reduces a run. `records` may be empty (dry-run, `stats` command).
    pub fn from_run(results: &[CategorizationResult], records: &[OperationRecord]) -> Self {
        let mut stats = Self::default();

        for result in results {
            let record = &result.record;
            stats.total_files += 1;
            stats.total_bytes += record.size;
            stats
                .categories
                .entry(result.category.clone())
                .or_default()
                .add(record.size);

            let ext = if record.extension.is_empty() {
                NO_EXTENSION
            } else {
                record.extension.as_str()
            };
            stats.extensions.entry(ext.to_string()).or_default().add(record.size);

            stats.date_range = Some(match stats.date_range {
                None => DateRange {
                    oldest: record.modified,
                    newest: record.modified,
                },
                Some(range) => DateRange {
                    oldest: range.oldest.min(record.modified),
                    newest: range.newest.max(record.modified),
                },
            });
        }

        for op in records {
            match (op.action, op.status) {
                (ActionKind::Undo, _) => {}
                (_, Status::Undone) => stats.undone += 1,
                (ActionKind::Copy, Status::Done) => stats.copied += 1,
                (ActionKind::Copy, Status::Failed) => stats.failed += 1,
                (ActionKind::Skip, _) => stats.skipped += 1,
                (ActionKind::Plan, Status::Pending) => stats.pending += 1,
                _ => {}
            }
        }

        stats
    }

    pub fn average_size(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            self.total_bytes as f64 / self.total_files as f64
        }
    }

    /// Percentage of attempted copies that completed; 0 when nothing was attempted.
    pub fn success_rate(&self) -> f64 {
        let attempted = self.copied + self.undone + self.failed + self.skipped + self.pending;
        if attempted == 0 {
            0.0
        } else {
            (self.copied + self.undone) as f64 * 100.0 / attempted as f64
        }
    }

    /// The `n` largest categories by file count, ties by name.
    pub fn top_categories(&self, n: usize) -> Vec<(&str, Bucket)> {
        top(&self.categories, n)
    }

    /// The `n` most common extensions, ties by name.
    pub fn top_extensions(&self, n: usize) -> Vec<(&str, Bucket)> {
        top(&self.extensions, n)
    }
}

fn top(map: &BTreeMap<String, Bucket>, n: usize) -> Vec<(&str, Bucket)> {
    let mut entries: Vec<(&str, Bucket)> = map.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    // Stable sort keeps the BTreeMap's name order among equal counts.
    entries.sort_by(|a, b| b.1.count.cmp(&a.1.count));
    entries.truncate(n);
    entries
}
