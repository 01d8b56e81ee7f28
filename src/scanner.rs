//! Directory scanning and per-file metadata extraction.
//!
//! The scanner walks a source root in a stable order (file names sorted at
//! every level) and turns each regular file into an immutable [`FileRecord`].
//! It makes no judgment about what a file *means*; that is the rule engine's
//! job.

use crate::duplicates::{ContentHash, HashAlgorithm};
use chrono::{DateTime, Local};
use rayon::ThreadPool;
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Bytes read from the head of every file for magic-number sniffing.
const HEAD_LEN: usize = 8192;

/// Default size of the text sample used by content keyword rules.
pub const DEFAULT_SAMPLE_BYTES: usize = 512;

/// Extensions treated as text even when no MIME type says so.
const TEXT_EXTENSIONS: &[&str] = &[
    ".txt", ".md", ".csv", ".log", ".json", ".xml", ".html", ".htm", ".css", ".js", ".ts",
    ".py", ".java", ".c", ".cpp", ".h", ".hpp", ".rs", ".go", ".rb", ".php", ".sh", ".yaml",
    ".yml", ".toml", ".ini", ".rtf",
];

/// Errors raised before a scan can start.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("cannot scan {}: {source}", path.display())]
    InvalidRoot { path: PathBuf, source: io::Error },
    #[error("cannot scan {}: not a directory", path.display())]
    NotADirectory { path: PathBuf },
}

/// Immutable descriptor of one scanned file.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Path relative to the scan root.
    pub relative_path: PathBuf,
    /// File name, lossily converted to UTF-8.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Creation time, when the platform reports one.
    pub created: Option<DateTime<Local>>,
    /// Last modification time.
    pub modified: DateTime<Local>,
    /// Lower-cased extension including the leading dot, or empty.
    pub extension: String,
    /// MIME type detected from content, falling back to the extension.
    pub mime_type: Option<String>,
    /// Best-effort decoded head of text-like files.
    pub text_sample: Option<String>,
    content_hash: OnceLock<ContentHash>,
}

impl FileRecord {
    /// Builds a record from already-known facts. Used by [`extract`] and by
    /// callers that obtain metadata some other way.
    pub fn new(
        path: impl Into<PathBuf>,
        relative_path: impl Into<PathBuf>,
        size: u64,
        modified: DateTime<Local>,
    ) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = extension_of(&path);
        Self {
            path,
            relative_path: relative_path.into(),
            name,
            size,
            created: None,
            modified,
            extension,
            mime_type: None,
            text_sample: None,
            content_hash: OnceLock::new(),
        }
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn with_text_sample(mut self, sample: impl Into<String>) -> Self {
        self.text_sample = Some(sample.into());
        self
    }

    pub fn with_created(mut self, created: DateTime<Local>) -> Self {
        self.created = Some(created);
        self
    }

    /// Directory of the file relative to the scan root (empty for files at
    /// the root).
    pub fn relative_dir(&self) -> &Path {
        self.relative_path.parent().unwrap_or(Path::new(""))
    }

    /// Returns the content digest, computing it on first request.
    ///
    /// The first successful digest is cached. Asking for a different
    /// algorithm than the cached one computes a fresh digest without
    /// replacing the cache.
    pub fn content_hash(&self, algorithm: HashAlgorithm) -> io::Result<String> {
        if let Some(cached) = self.content_hash.get()
            && cached.algorithm == algorithm
        {
            return Ok(cached.digest.clone());
        }
        let digest = algorithm.hash_file(&self.path)?;
        let _ = self.content_hash.set(ContentHash {
            algorithm,
            digest: digest.clone(),
        });
        Ok(digest)
    }

    /// The cached digest, if one has been computed.
    pub fn cached_hash(&self) -> Option<&ContentHash> {
        self.content_hash.get()
    }
}

/// One step of a scan.
#[derive(Debug, Clone)]
pub enum ScanItem {
    Record(FileRecord),
    /// The entry could not be read; the scan goes on.
    Unreadable { path: PathBuf, reason: String },
}

/// Walks a source root and extracts [`FileRecord`]s.
///
/// # Examples
///
/// ```no_run
/// use dirsort::scanner::{ScanItem, Scanner};
/// use std::path::Path;
///
/// let scanner = Scanner::new(Path::new("/home/user/Downloads"), true).unwrap();
/// for item in scanner.iter() {
///     if let ScanItem::Record(record) = item {
///         println!("{} ({} bytes)", record.relative_path.display(), record.size);
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    recursive: bool,
    follow_links: bool,
    sample_bytes: usize,
    excluded: Vec<PathBuf>,
}

impl Scanner {
    /// Creates a scanner for `root`, which must be an existing directory.
    pub fn new(root: &Path, recursive: bool) -> Result<Self, ScanError> {
        let root = fs::canonicalize(root).map_err(|source| ScanError::InvalidRoot {
            path: root.to_path_buf(),
            source,
        })?;
        if !root.is_dir() {
            return Err(ScanError::NotADirectory { path: root });
        }
        Ok(Self {
            root,
            recursive,
            follow_links: true,
            sample_bytes: DEFAULT_SAMPLE_BYTES,
            excluded: Vec::new(),
        })
    }

    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    pub fn sample_bytes(mut self, bytes: usize) -> Self {
        self.sample_bytes = bytes;
        self
    }

    /// Prunes `path` (and everything below it) from the walk.
    ///
    /// An exclusion that contains the scan root itself is ignored, so a target
    /// that is a parent of the source never hides the whole source tree.
    pub fn exclude(mut self, path: &Path) -> Self {
        let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if self.root.starts_with(&path) {
            debug!(path = %path.display(), root = %self.root.display(), "exclusion contains the scan root, ignored");
        } else {
            self.excluded.push(path);
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily walks the tree and extracts records one by one.
    ///
    /// Each call starts a fresh walk, so the sequence can be replayed.
    pub fn iter(&self) -> impl Iterator<Item = ScanItem> + '_ {
        self.walk().map(|entry| match entry {
            Ok(path) => self.extract_item(path),
            Err((path, reason)) => {
                warn!(path = %path.display(), %reason, "skipping unreadable entry");
                ScanItem::Unreadable { path, reason }
            }
        })
    }

    /// Walks the tree, then extracts all records on `pool`.
    ///
    /// Output order matches [`Scanner::iter`].
    pub fn extract_all(&self, pool: &ThreadPool) -> Vec<ScanItem> {
        let entries: Vec<_> = self.walk().collect();
        debug!(entries = entries.len(), root = %self.root.display(), "walk complete");
        pool.install(|| {
            entries
                .into_par_iter()
                .map(|entry| match entry {
                    Ok(path) => self.extract_item(path),
                    Err((path, reason)) => {
                        warn!(path = %path.display(), %reason, "skipping unreadable entry");
                        ScanItem::Unreadable { path, reason }
                    }
                })
                .collect()
        })
    }

    /// Regular files under the root in walk order, or the entries that
    /// could not be visited.
    fn walk(&self) -> impl Iterator<Item = Result<PathBuf, (PathBuf, String)>> + '_ {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        WalkDir::new(&self.root)
            .follow_links(self.follow_links)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_excluded(entry))
            .filter_map(|entry| match entry {
                Ok(entry) if entry.file_type().is_file() => Some(Ok(entry.into_path())),
                Ok(_) => None,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    Some(Err((path, err.to_string())))
                }
            })
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        self.excluded.iter().any(|ex| entry.path().starts_with(ex))
    }

    fn extract_item(&self, path: PathBuf) -> ScanItem {
        match extract(&path, &self.root, self.sample_bytes) {
            Ok(record) => ScanItem::Record(record),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "file unreadable");
                ScanItem::Unreadable {
                    reason: err.to_string(),
                    path,
                }
            }
        }
    }
}

/// Extracts the metadata of a single file.
///
/// Reads at most the first few kilobytes: enough for MIME sniffing and the
/// text sample.
pub fn extract(path: &Path, root: &Path, sample_bytes: usize) -> io::Result<FileRecord> {
    let metadata = fs::metadata(path)?;
    let mut head = Vec::with_capacity(HEAD_LEN.max(sample_bytes));
    File::open(path)?
        .take(HEAD_LEN.max(sample_bytes) as u64)
        .read_to_end(&mut head)?;

    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut record = FileRecord::new(
        path,
        relative,
        metadata.len(),
        DateTime::from(metadata.modified()?),
    );
    record.created = metadata.created().ok().map(DateTime::from);
    record.mime_type = detect_mime(path, &head);

    if is_text_like(&record.extension, record.mime_type.as_deref()) {
        let end = head.len().min(sample_bytes);
        record.text_sample = Some(String::from_utf8_lossy(&head[..end]).into_owned());
    }

    Ok(record)
}

/// Sniffs the MIME type from magic bytes, falling back to the extension.
fn detect_mime(path: &Path, head: &[u8]) -> Option<String> {
    infer::get(head)
        .map(|kind| kind.mime_type().to_string())
        .or_else(|| {
            mime_guess::from_path(path)
                .first()
                .map(|mime| mime.essence_str().to_string())
        })
}

fn is_text_like(extension: &str, mime: Option<&str>) -> bool {
    if let Some(mime) = mime
        && (mime.starts_with("text/")
            || mime == "application/json"
            || mime == "application/xml"
            || mime == "application/javascript")
    {
        return true;
    }
    TEXT_EXTENSIONS.contains(&extension)
}

/// Lower-cased extension with its leading dot, empty when there is none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}
