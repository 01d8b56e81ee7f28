//! Byte-identical duplicate detection.
//!
//! Two-stage filter: files are first bucketed by exact size, and only buckets
//! with more than one member are ever hashed. A file with a unique size cannot
//! have a duplicate, so it is never read.

use crate::scanner::FileRecord;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::hash::Hasher as _;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};
use twox_hash::XxHash64;

const CHUNK_SIZE: usize = 64 * 1024;

/// Digest used to compare file contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256, the default.
    #[default]
    Sha256,
    /// BLAKE3, cryptographic and considerably faster.
    Blake3,
    /// XxHash64. Not cryptographic; fine for trusted local trees.
    Xxh64,
}

impl HashAlgorithm {
    /// Streams the file through the digest and returns it as lowercase hex.
    pub fn hash_file(&self, path: &Path) -> io::Result<String> {
        let mut file = File::open(path)?;
        match self {
            HashAlgorithm::Sha256 => {
                let mut hasher = sha2::Sha256::new();
                read_chunks(&mut file, |chunk| hasher.update(chunk))?;
                Ok(format!("{:x}", hasher.finalize()))
            }
            HashAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                read_chunks(&mut file, |chunk| {
                    hasher.update(chunk);
                })?;
                Ok(hasher.finalize().to_hex().to_string())
            }
            HashAlgorithm::Xxh64 => {
                let mut hasher = XxHash64::with_seed(0);
                read_chunks(&mut file, |chunk| hasher.write(chunk))?;
                Ok(format!("{:016x}", hasher.finish()))
            }
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
            HashAlgorithm::Xxh64 => "xxh64",
        };
        f.write_str(name)
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            "xxh64" => Ok(HashAlgorithm::Xxh64),
            other => Err(format!(
                "unknown hash algorithm '{}': expected sha256, blake3 or xxh64",
                other
            )),
        }
    }
}

fn read_chunks(reader: &mut impl Read, mut sink: impl FnMut(&[u8])) -> io::Result<()> {
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(n) => sink(&buffer[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// A digest together with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHash {
    pub algorithm: HashAlgorithm,
    pub digest: String,
}

/// Two or more files with the same size and content digest.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub hash: String,
    pub size: u64,
    /// Members in discovery order.
    pub members: Vec<Arc<FileRecord>>,
}

impl DuplicateGroup {
    /// Bytes that would be freed by keeping a single copy.
    pub fn wasted_space(&self) -> u64 {
        self.size * (self.members.len() as u64 - 1)
    }
}

/// A file that could not be hashed and was left out of grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct HashFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Output of a duplicate search.
#[derive(Debug, Clone, Default)]
pub struct DuplicateReport {
    pub groups: Vec<DuplicateGroup>,
    pub failures: Vec<HashFailure>,
    /// Number of files whose content was actually hashed.
    pub hashed_files: usize,
}

impl DuplicateReport {
    pub fn total_wasted_space(&self) -> u64 {
        self.groups.iter().map(DuplicateGroup::wasted_space).sum()
    }

    pub fn duplicate_file_count(&self) -> usize {
        self.groups.iter().map(|g| g.members.len()).sum()
    }
}

/// Finds groups of byte-identical files.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateDetector {
    algorithm: HashAlgorithm,
}

impl DuplicateDetector {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Groups `records` by size, then by content digest.
    ///
    /// Hashing runs on the current rayon pool. Empty files are ignored.
    /// Groups are ordered by their first member's position in `records`.
    pub fn find_duplicates(&self, records: &[Arc<FileRecord>]) -> DuplicateReport {
        let mut by_size: HashMap<u64, Vec<usize>> = HashMap::new();
        for (index, record) in records.iter().enumerate() {
            if record.size > 0 {
                by_size.entry(record.size).or_default().push(index);
            }
        }

        let mut candidates: Vec<usize> = by_size
            .into_values()
            .filter(|bucket| bucket.len() > 1)
            .flatten()
            .collect();
        candidates.sort_unstable();
        debug!(
            candidates = candidates.len(),
            total = records.len(),
            "size buckets built"
        );

        let algorithm = self.algorithm;
        let hashed: Vec<(usize, io::Result<String>)> = candidates
            .par_iter()
            .map(|&index| (index, records[index].content_hash(algorithm)))
            .collect();

        let mut report = DuplicateReport {
            hashed_files: hashed.len(),
            ..Default::default()
        };
        let mut by_content: HashMap<(u64, String), Vec<usize>> = HashMap::new();
        for (index, result) in hashed {
            let record = &records[index];
            match result {
                Ok(digest) => by_content
                    .entry((record.size, digest))
                    .or_default()
                    .push(index),
                Err(err) => {
                    warn!(path = %record.path.display(), error = %err, "hash computation failed");
                    report.failures.push(HashFailure {
                        path: record.path.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let mut groups: Vec<(usize, DuplicateGroup)> = by_content
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|((size, hash), members)| {
                let first = members[0];
                let group = DuplicateGroup {
                    hash,
                    size,
                    members: members.iter().map(|&i| Arc::clone(&records[i])).collect(),
                };
                (first, group)
            })
            .collect();
        groups.sort_by_key(|(first, _)| *first);
        report.groups = groups.into_iter().map(|(_, group)| group).collect();
        report
    }
}
