//! Configuration: categories, filtering rules and run settings.
//!
//! Configuration is stored in TOML. Every section is optional; missing values
//! fall back to the built-in defaults.
//!
//! # Configuration File Format
//!
//! ```toml
//! [categories.invoices]
//! extensions = [".pdf"]
//! keywords = ["invoice", "receipt"]
//! mime_types = ["application/pdf"]
//!
//! [filters]
//! enable_hidden_files = false
//! min_size = 1
//! max_size = 1073741824
//! min_modified = "2020-01-01"   # inclusive, local date of last modification
//! max_modified = "2024-12-31"
//!
//! [filters.exclude]
//! filenames = [".DS_Store", "Thumbs.db"]
//! patterns = ["*.tmp", "node_modules/**"]
//! extensions = ["bak", "tmp"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//!
//! [organize]
//! strategy = "category"      # or "date"
//! subcategorize = true
//! preserve_structure = true
//! recursive = true
//! threads = 4
//! sample_bytes = 512
//! content_hit_cap = 5
//! journal_dir = ".dirsort"
//!
//! [duplicates]
//! enabled = false
//! algorithm = "sha256"       # or "blake3", "xxh64"
//!
//! [subtypes]
//! ".kt" = "kotlin"
//! ```
//!
//! Categories given here are merged over the built-in table: a new name adds a
//! category, an existing name replaces the built-in definition.

use crate::duplicates::HashAlgorithm;
use crate::file_category::{CategoryConfigInvalid, CategoryDefinition, CategorySet, SubtypeMapper};
use crate::journal::JOURNAL_DIR_NAME;
use crate::placement::{PlacementOptions, Strategy};
use crate::scanner::{DEFAULT_SAMPLE_BYTES, FileRecord};
use chrono::NaiveDate;
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Name of the per-directory configuration file.
pub const LOCAL_CONFIG_FILE: &str = ".dirsortrc.toml";

/// Errors that can occur during configuration loading and filtering.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    /// Invalid glob pattern provided.
    #[error("Invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),
    /// Invalid regex pattern provided with the actual error reason.
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },
    /// A setting is out of range.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    /// The category table is unusable.
    #[error(transparent)]
    Categories(#[from] CategoryConfigInvalid),
    /// IO error while reading configuration.
    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// Complete configuration of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub categories: BTreeMap<String, CategoryTable>,
    pub filters: FilterRules,
    pub organize: OrganizeSettings,
    pub duplicates: DuplicateSettings,
    /// Extra extension → subtype directory entries.
    pub subtypes: BTreeMap<String, String>,
}

/// One `[categories.<name>]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryTable {
    pub extensions: Vec<String>,
    pub keywords: Vec<String>,
    pub mime_types: Vec<String>,
}

/// Root-level filter rules configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether to include hidden files (starting with "."). Defaults to false.
    #[serde(default)]
    pub enable_hidden_files: bool,

    /// Files smaller than this many bytes are skipped.
    #[serde(default)]
    pub min_size: Option<u64>,

    /// Files larger than this many bytes are skipped.
    #[serde(default)]
    pub max_size: Option<u64>,

    /// Files last modified before this day are skipped.
    #[serde(default)]
    pub min_modified: Option<NaiveDate>,

    /// Files last modified after this day are skipped.
    #[serde(default)]
    pub max_modified: Option<NaiveDate>,

    /// Rules for excluding files.
    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Rules for including files (whitelist, overrides exclude rules).
    #[serde(default)]
    pub include: IncludeRules,
}

/// Rules for excluding files from organization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., ".DS_Store", "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns matched against the path relative to the source root.
    #[serde(default)]
    pub patterns: Vec<String>,

    /// File extensions to exclude, with or without the dot.
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Rules for including files, overriding exclude rules (whitelist).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeRules {
    /// Glob patterns that override exclude rules.
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// `[organize]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizeSettings {
    pub strategy: Strategy,
    pub subcategorize: bool,
    pub preserve_structure: bool,
    pub recursive: bool,
    pub follow_links: bool,
    /// Worker threads for extraction, categorization and hashing.
    /// Defaults to the available parallelism.
    pub threads: Option<usize>,
    pub sample_bytes: usize,
    /// Maximum content keyword hits counted per category. Unlimited if unset.
    pub content_hit_cap: Option<usize>,
    /// Journal directory; relative paths are resolved against the target root.
    pub journal_dir: Option<PathBuf>,
}

impl Default for OrganizeSettings {
    fn default() -> Self {
        Self {
            strategy: Strategy::Category,
            subcategorize: true,
            preserve_structure: true,
            recursive: true,
            follow_links: true,
            threads: None,
            sample_bytes: DEFAULT_SAMPLE_BYTES,
            content_hit_cap: None,
            journal_dir: None,
        }
    }
}

impl OrganizeSettings {
    pub fn placement_options(&self) -> PlacementOptions {
        PlacementOptions {
            strategy: self.strategy,
            subcategorize: self.subcategorize,
            preserve_structure: self.preserve_structure,
        }
    }

    /// Number of worker threads to use.
    pub fn resolved_threads(&self) -> usize {
        self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Where journals for `target_root` live.
    pub fn journal_dir_for(&self, target_root: &Path) -> PathBuf {
        match &self.journal_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => target_root.join(dir),
            None => target_root.join(JOURNAL_DIR_NAME),
        }
    }
}

/// `[duplicates]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateSettings {
    /// Run duplicate detection as part of `organize`.
    pub enabled: bool,
    pub algorithm: HashAlgorithm,
}

impl Config {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.dirsortrc.toml` in the current directory
    /// 3. Look for `~/.config/dirsort/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but
    /// cannot be read, or if any file found is invalid.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("dirsort")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        debug!("no configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if file does not exist.
    /// Returns `ConfigError::ConfigInvalid` if TOML parsing fails.
    /// Returns `ConfigError::IoError` if file cannot be read.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        debug!(path = %path.display(), "loading configuration");
        Self::from_toml(&content)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges that the TOML types cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.organize.threads == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "organize.threads",
                reason: "must be at least 1".to_string(),
            });
        }
        if let (Some(min), Some(max)) = (self.filters.min_size, self.filters.max_size)
            && min > max
        {
            return Err(ConfigError::InvalidValue {
                field: "filters.min_size",
                reason: format!("{} is larger than max_size {}", min, max),
            });
        }
        if let (Some(min), Some(max)) = (self.filters.min_modified, self.filters.max_modified)
            && min > max
        {
            return Err(ConfigError::InvalidValue {
                field: "filters.min_modified",
                reason: format!("{} is after max_modified {}", min, max),
            });
        }
        Ok(())
    }

    /// The built-in categories with the configured ones merged over them.
    ///
    /// # Errors
    ///
    /// `ConfigError::Categories` when a configured category is invalid.
    pub fn category_set(&self) -> Result<CategorySet, ConfigError> {
        let mut table: BTreeMap<String, CategoryDefinition> = CategorySet::builtin()
            .iter()
            .map(|definition| (definition.name.clone(), definition.clone()))
            .collect();

        for (name, entry) in &self.categories {
            let definition =
                CategoryDefinition::new(name, &entry.extensions, &entry.keywords, &entry.mime_types);
            table.insert(definition.name.clone(), definition);
        }

        Ok(CategorySet::new(table.into_values().collect())?)
    }

    /// The standard subtype table plus the configured entries.
    pub fn subtype_mapper(&self) -> SubtypeMapper {
        let mut mapper = SubtypeMapper::default();
        for (ext, subtype) in &self.subtypes {
            mapper.add_subtype_mapping(ext, subtype);
        }
        mapper
    }

    /// Compile the filter section into matchers.
    ///
    /// # Errors
    ///
    /// Returns an error if any regex or glob patterns are invalid.
    pub fn compile_filters(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(&self.filters)
    }
}

/// Compiled filter structures for efficient file matching.
///
/// Glob and regex patterns are parsed once here instead of on every file.
#[derive(Debug)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    min_size: Option<u64>,
    max_size: Option<u64>,
    min_modified: Option<NaiveDate>,
    max_modified: Option<NaiveDate>,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

fn compile_globs(patterns: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
        })
        .collect()
}

impl CompiledFilters {
    /// Create compiled filters from filter rules.
    ///
    /// # Errors
    ///
    /// Returns an error if any glob or regex patterns are invalid.
    pub fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            min_size: rules.min_size,
            max_size: rules.max_size,
            min_modified: rules.min_modified,
            max_modified: rules.max_modified,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns: compile_globs(&rules.exclude.patterns)?,
            exclude_regexes,
            include_patterns: compile_globs(&rules.include.patterns)?,
        })
    }

    /// Whether a scanned file takes part in the run: size bounds, then the
    /// modification date bounds, then the path rules on its path relative to
    /// the source root. All bounds are inclusive.
    pub fn accepts(&self, record: &FileRecord) -> bool {
        if self.min_size.is_some_and(|min| record.size < min)
            || self.max_size.is_some_and(|max| record.size > max)
        {
            return false;
        }
        let modified = record.modified.date_naive();
        if self.min_modified.is_some_and(|min| modified < min)
            || self.max_modified.is_some_and(|max| modified > max)
        {
            return false;
        }
        self.should_include(&record.relative_path)
    }

    /// Check if a path passes the name and pattern rules.
    ///
    /// Checks are performed in this order, with early termination:
    /// 1. Include patterns (whitelist) - if matched, always include
    /// 2. Hidden file filter - if hidden and disabled, exclude
    /// 3. Exact filename match - if matched, exclude
    /// 4. File extension match - if matched, exclude
    /// 5. Glob pattern match - if matched, exclude
    /// 6. Regex pattern match - if matched, exclude
    /// 7. Default: include
    pub fn should_include(&self, file_path: &Path) -> bool {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self
            .include_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path))
        {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = file_path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return false;
            }
        }

        if self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path))
        {
            return false;
        }

        !self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }
}
