//! Weighted, multi-signal file categorization.
//!
//! Every configured [`CategoryDefinition`] is scored against a file by four
//! independent rules. Scores are additive and the best-scoring category wins.
//!
//! | Rule     | Weight          | Fires when                                         |
//! |----------|-----------------|----------------------------------------------------|
//! | Extension| 0.4             | the file's extension is listed                     |
//! | MIME     | 0.3             | the MIME type starts with a listed prefix          |
//! | Content  | 0.1 per keyword | a keyword occurs in the text sample                |
//! | Filename | 0.2             | any keyword occurs in the file name                |
//!
//! Confidence is the raw sum, so a file hitting many content keywords can
//! score above 1.0.
//!
//! # Examples
//!
//! ```
//! use dirsort::file_category::{CategoryDefinition, CategorySet, RuleEngine};
//! use dirsort::scanner::FileRecord;
//! use std::sync::Arc;
//!
//! let categories = CategorySet::new(vec![CategoryDefinition::new(
//!     "documents",
//!     [".pdf"],
//!     Vec::<String>::new(),
//!     Vec::<String>::new(),
//! )])
//! .unwrap();
//! let engine = RuleEngine::new(categories);
//! let record = Arc::new(FileRecord::new("/tmp/q3.pdf", "q3.pdf", 10, chrono::Local::now()));
//!
//! let result = engine.categorize(&record);
//! assert_eq!(result.category, "documents");
//! assert_eq!(result.confidence, 0.4);
//! ```
use crate::scanner::FileRecord;
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Category assigned when no rule fires for any definition.
pub const OTHER_CATEGORY: &str = "other";

/// Rule weights in hundredths, so sums and ties stay exact.
pub const EXTENSION_POINTS: u32 = 40;
pub const MIME_POINTS: u32 = 30;
pub const CONTENT_POINTS_PER_HIT: u32 = 10;
pub const FILENAME_POINTS: u32 = 20;

/// The category table is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid category configuration: {0}")]
pub struct CategoryConfigInvalid(pub String);

/// A named organizational bucket and the signals that select it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDefinition {
    pub name: String,
    /// Lower-cased, each with a leading dot.
    pub extensions: BTreeSet<String>,
    /// Lower-cased.
    pub keywords: BTreeSet<String>,
    /// Lower-cased MIME prefixes.
    pub mime_prefixes: BTreeSet<String>,
}

impl CategoryDefinition {
    /// Creates a definition, normalizing its entries.
    ///
    /// Extensions may be given with or without the leading dot. Blank
    /// entries are dropped.
    pub fn new<E, K, M>(
        name: impl Into<String>,
        extensions: impl IntoIterator<Item = E>,
        keywords: impl IntoIterator<Item = K>,
        mime_types: impl IntoIterator<Item = M>,
    ) -> Self
    where
        E: AsRef<str>,
        K: AsRef<str>,
        M: AsRef<str>,
    {
        Self {
            name: name.into().trim().to_string(),
            extensions: extensions
                .into_iter()
                .filter_map(|ext| normalize_extension(ext.as_ref()))
                .collect(),
            keywords: normalized(keywords),
            mime_prefixes: normalized(mime_types),
        }
    }

    fn has_signals(&self) -> bool {
        !(self.extensions.is_empty() && self.keywords.is_empty() && self.mime_prefixes.is_empty())
    }
}

fn normalized<S: AsRef<str>>(items: impl IntoIterator<Item = S>) -> BTreeSet<String> {
    items
        .into_iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Lower-cases an extension and makes sure it starts with a dot.
pub fn normalize_extension(ext: &str) -> Option<String> {
    let ext = ext.trim().trim_start_matches('.').to_lowercase();
    if ext.is_empty() {
        None
    } else {
        Some(format!(".{}", ext))
    }
}

/// A validated, read-only table of category definitions, keyed by name.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySet {
    definitions: BTreeMap<String, CategoryDefinition>,
}

impl CategorySet {
    /// Validates and indexes `definitions`.
    ///
    /// # Errors
    ///
    /// Fails when the table is empty, a name is blank, duplicated, reserved
    /// (`other`) or contains a path separator, or a definition has no
    /// signals at all.
    pub fn new(definitions: Vec<CategoryDefinition>) -> Result<Self, CategoryConfigInvalid> {
        if definitions.is_empty() {
            return Err(CategoryConfigInvalid("no categories defined".to_string()));
        }
        let mut table = BTreeMap::new();
        for definition in definitions {
            let name = definition.name.clone();
            if name.is_empty() {
                return Err(CategoryConfigInvalid("category name is empty".to_string()));
            }
            if name.eq_ignore_ascii_case(OTHER_CATEGORY) {
                return Err(CategoryConfigInvalid(format!(
                    "'{}' is reserved for unmatched files",
                    OTHER_CATEGORY
                )));
            }
            if name.contains(['/', '\\']) || name == "." || name == ".." {
                return Err(CategoryConfigInvalid(format!(
                    "category '{}' is not a valid directory name",
                    name
                )));
            }
            if !definition.has_signals() {
                return Err(CategoryConfigInvalid(format!(
                    "category '{}' has no extensions, keywords or MIME types",
                    name
                )));
            }
            if table.insert(name.clone(), definition).is_some() {
                return Err(CategoryConfigInvalid(format!(
                    "category '{}' is defined twice",
                    name
                )));
            }
        }
        Ok(Self { definitions: table })
    }

    /// The built-in table used when no configuration overrides it.
    pub fn builtin() -> Self {
        let definitions = builtin_definitions()
            .into_iter()
            .map(|definition| (definition.name.clone(), definition))
            .collect();
        Self { definitions }
    }

    pub fn get(&self, name: &str) -> Option<&CategoryDefinition> {
        self.definitions.get(name)
    }

    /// Definitions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &CategoryDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn builtin_definitions() -> Vec<CategoryDefinition> {
    vec![
        CategoryDefinition::new(
            "documents",
            [".pdf", ".doc", ".docx", ".txt", ".rtf", ".odt"],
            ["document", "report", "letter", "memo"],
            ["application/pdf", "application/msword"],
        ),
        CategoryDefinition::new(
            "images",
            [".jpg", ".jpeg", ".png", ".gif", ".bmp", ".svg", ".webp"],
            ["image", "photo", "picture", "screenshot"],
            ["image/"],
        ),
        CategoryDefinition::new(
            "videos",
            [".mp4", ".avi", ".mkv", ".mov", ".wmv", ".flv", ".webm"],
            ["video", "movie", "clip", "recording"],
            ["video/"],
        ),
        CategoryDefinition::new(
            "audio",
            [".mp3", ".wav", ".flac", ".aac", ".ogg", ".m4a"],
            ["audio", "music", "song", "sound"],
            ["audio/"],
        ),
        CategoryDefinition::new(
            "code",
            [
                ".py", ".js", ".java", ".cpp", ".c", ".html", ".css", ".php", ".rb", ".go", ".rs",
                ".swift", ".ts",
            ],
            ["code", "program", "script", "function", "class"],
            ["text/x-python", "text/javascript", "text/x-java"],
        ),
        CategoryDefinition::new(
            "archives",
            [".zip", ".rar", ".7z", ".tar", ".gz", ".bz2"],
            ["archive", "compressed", "zip"],
            ["application/zip", "application/x-rar"],
        ),
        CategoryDefinition::new(
            "spreadsheets",
            [".xls", ".xlsx", ".csv", ".ods"],
            ["spreadsheet", "excel", "data", "table"],
            [
                "application/vnd.ms-excel",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ],
        ),
        CategoryDefinition::new(
            "presentations",
            [".ppt", ".pptx", ".odp"],
            ["presentation", "slides", "powerpoint"],
            ["application/vnd.ms-powerpoint"],
        ),
    ]
}

/// Which rule contributed to a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Extension,
    Mime,
    Content,
    Filename,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalKind::Extension => "extension",
            SignalKind::Mime => "mime",
            SignalKind::Content => "content",
            SignalKind::Filename => "filename",
        };
        f.write_str(name)
    }
}

/// One scoring rule. Each variant evaluates a file against a single
/// definition and returns the points it contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Extension,
    Mime,
    /// `hit_cap` bounds how many keyword hits are counted.
    Content { hit_cap: Option<usize> },
    Filename,
}

impl Rule {
    pub fn kind(&self) -> SignalKind {
        match self {
            Rule::Extension => SignalKind::Extension,
            Rule::Mime => SignalKind::Mime,
            Rule::Content { .. } => SignalKind::Content,
            Rule::Filename => SignalKind::Filename,
        }
    }

    /// Points (hundredths) this rule awards `record` for `definition`.
    pub fn evaluate(&self, record: &FileRecord, definition: &CategoryDefinition) -> u32 {
        match self {
            Rule::Extension => {
                if !record.extension.is_empty() && definition.extensions.contains(&record.extension)
                {
                    EXTENSION_POINTS
                } else {
                    0
                }
            }
            Rule::Mime => {
                let Some(mime) = record.mime_type.as_deref() else {
                    return 0;
                };
                let mime = mime.to_lowercase();
                if definition
                    .mime_prefixes
                    .iter()
                    .any(|prefix| mime.starts_with(prefix.as_str()))
                {
                    MIME_POINTS
                } else {
                    0
                }
            }
            Rule::Content { hit_cap } => {
                let Some(sample) = record.text_sample.as_deref() else {
                    return 0;
                };
                let sample = sample.to_lowercase();
                let hits = definition
                    .keywords
                    .iter()
                    .filter(|keyword| sample.contains(keyword.as_str()))
                    .count();
                let hits = hit_cap.map_or(hits, |cap| hits.min(cap));
                hits as u32 * CONTENT_POINTS_PER_HIT
            }
            Rule::Filename => {
                let name = record.name.to_lowercase();
                if definition
                    .keywords
                    .iter()
                    .any(|keyword| name.contains(keyword.as_str()))
                {
                    FILENAME_POINTS
                } else {
                    0
                }
            }
        }
    }
}

/// The category assigned to one file.
#[derive(Debug, Clone)]
pub struct CategorizationResult {
    pub record: Arc<FileRecord>,
    pub category: String,
    /// Raw additive score; may exceed 1.0.
    pub confidence: f64,
    /// Rules that fired for the winning category, in rule order.
    pub signals: Vec<SignalKind>,
}

/// Score of one definition for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryScore<'a> {
    pub name: &'a str,
    pub points: u32,
    pub signals: Vec<SignalKind>,
}

impl CategoryScore<'_> {
    fn fired(&self, kind: SignalKind) -> bool {
        self.signals.contains(&kind)
    }

    /// Ranking used to pick a winner: score, then extension fired, then
    /// MIME fired, then the smaller name.
    fn rank(&self, other: &Self) -> Ordering {
        self.points
            .cmp(&other.points)
            .then(self.fired(SignalKind::Extension).cmp(&other.fired(SignalKind::Extension)))
            .then(self.fired(SignalKind::Mime).cmp(&other.fired(SignalKind::Mime)))
            .then(other.name.cmp(self.name))
    }
}

/// Assigns every file exactly one category.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    categories: CategorySet,
    rules: Vec<Rule>,
}

impl RuleEngine {
    pub fn new(categories: CategorySet) -> Self {
        Self {
            categories,
            rules: vec![
                Rule::Extension,
                Rule::Mime,
                Rule::Content { hit_cap: None },
                Rule::Filename,
            ],
        }
    }

    /// Limits how many content keyword hits count towards a score.
    pub fn with_content_hit_cap(mut self, cap: Option<usize>) -> Self {
        for rule in &mut self.rules {
            if let Rule::Content { hit_cap } = rule {
                *hit_cap = cap;
            }
        }
        self
    }

    pub fn categories(&self) -> &CategorySet {
        &self.categories
    }

    /// Scores `record` against a single definition.
    pub fn score<'a>(&self, record: &FileRecord, definition: &'a CategoryDefinition) -> CategoryScore<'a> {
        let mut points = 0;
        let mut signals = Vec::new();
        for rule in &self.rules {
            let awarded = rule.evaluate(record, definition);
            if awarded > 0 {
                points += awarded;
                signals.push(rule.kind());
            }
        }
        CategoryScore {
            name: &definition.name,
            points,
            signals,
        }
    }

    /// Scores of every definition, in name order.
    pub fn all_scores(&self, record: &FileRecord) -> Vec<CategoryScore<'_>> {
        self.categories
            .iter()
            .map(|definition| self.score(record, definition))
            .collect()
    }

    /// Picks the best category for `record`, or `other` when nothing fires.
    pub fn categorize(&self, record: &Arc<FileRecord>) -> CategorizationResult {
        let best = self
            .all_scores(record)
            .into_iter()
            .filter(|score| score.points > 0)
            .max_by(|a, b| a.rank(b));

        match best {
            Some(score) => CategorizationResult {
                record: Arc::clone(record),
                category: score.name.to_string(),
                confidence: f64::from(score.points) / 100.0,
                signals: score.signals,
            },
            None => CategorizationResult {
                record: Arc::clone(record),
                category: OTHER_CATEGORY.to_string(),
                confidence: 0.0,
                signals: Vec::new(),
            },
        }
    }

    /// Categorizes all records on the current rayon pool, keeping input order.
    pub fn categorize_all(&self, records: &[Arc<FileRecord>]) -> Vec<CategorizationResult> {
        records.par_iter().map(|record| self.categorize(record)).collect()
    }
}

/// Maps file extensions to the subtype directory used below a category.
///
/// Unknown extensions map to `other`.
#[derive(Debug, Clone)]
pub struct SubtypeMapper {
    subtypes: HashMap<String, String>,
}

impl SubtypeMapper {
    /// Creates a mapper with all standard mappings.
    pub fn new() -> Self {
        let mut mapper = Self {
            subtypes: HashMap::new(),
        };
        mapper.populate_standard_mappings();
        mapper
    }

    fn populate_standard_mappings(&mut self) {
        // Documents and office formats keep their extension as the subtype
        for ext in [
            "pdf", "doc", "docx", "txt", "rtf", "odt", "xls", "xlsx", "ppt", "pptx", "csv", "ods",
            "odp",
        ] {
            self.add_subtype_mapping(ext, ext);
        }

        // Images
        for ext in [
            "jpg", "jpeg", "png", "gif", "bmp", "svg", "webp", "ico", "tiff", "tif",
        ] {
            self.add_subtype_mapping(ext, ext);
        }

        // Videos
        for ext in ["mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "mpg", "mpeg"] {
            self.add_subtype_mapping(ext, ext);
        }

        // Audio
        for ext in ["mp3", "wav", "flac", "aac", "ogg", "m4a", "wma"] {
            self.add_subtype_mapping(ext, ext);
        }

        // Code uses language names
        self.add_subtype_mapping("py", "python");
        self.add_subtype_mapping("js", "javascript");
        self.add_subtype_mapping("java", "java");
        self.add_subtype_mapping("cpp", "cpp");
        self.add_subtype_mapping("c", "c");
        self.add_subtype_mapping("html", "html");
        self.add_subtype_mapping("css", "css");
        self.add_subtype_mapping("php", "php");
        self.add_subtype_mapping("rb", "ruby");
        self.add_subtype_mapping("go", "go");
        self.add_subtype_mapping("rs", "rust");
        self.add_subtype_mapping("swift", "swift");
        self.add_subtype_mapping("ts", "typescript");
        self.add_subtype_mapping("jsx", "jsx");
        self.add_subtype_mapping("tsx", "tsx");
        self.add_subtype_mapping("json", "json");
        self.add_subtype_mapping("xml", "xml");

        // Archives
        for ext in ["zip", "rar", "7z", "tar", "gz", "bz2", "xz"] {
            self.add_subtype_mapping(ext, ext);
        }
    }

    /// Adds or replaces an extension → subtype mapping.
    pub fn add_subtype_mapping(&mut self, ext: &str, subtype: &str) {
        if let Some(ext) = normalize_extension(ext) {
            self.subtypes.insert(ext, subtype.to_string());
        }
    }

    /// Subtype directory for `ext` (with or without the dot, any case).
    ///
    /// ```
    /// use dirsort::file_category::SubtypeMapper;
    ///
    /// let mapper = SubtypeMapper::default();
    /// assert_eq!(mapper.subtype_for(".PY"), "python");
    /// assert_eq!(mapper.subtype_for("pdf"), "pdf");
    /// assert_eq!(mapper.subtype_for(".unknown"), "other");
    /// ```
    pub fn subtype_for(&self, ext: &str) -> &str {
        normalize_extension(ext)
            .and_then(|ext| self.subtypes.get(&ext))
            .map(String::as_str)
            .unwrap_or(OTHER_CATEGORY)
    }
}

impl Default for SubtypeMapper {
    fn default() -> Self {
        Self::new()
    }
}
