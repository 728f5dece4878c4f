// src/index/mod.rs

//! Package index readers
//!
//! Every index format turns a file on disk into a list of
//! [`RawVersionRecord`]s that the [`CacheBuilder`] merges into the package
//! cache. Formats are a closed set ([`IndexFormat`]); configuration refers
//! to them by label through an [`IndexRegistry`] that is built once and
//! handed to cache construction.

mod json;
mod repomd;
mod sqlite;

pub use json::write_records;

use crate::cache::{CacheBuilder, DepType, FileId};
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::version::CompareOp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;

/// Where an index came from and how much it should be trusted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFileMetadata {
    pub label: String,
    pub origin: String,
    pub release: String,
    pub priority: Option<i32>,
    /// This index describes the installed system
    pub installed: bool,
    /// Seconds since the epoch; newer files win duplicate disputes
    pub timestamp: i64,
}

impl PackageFileMetadata {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            origin: String::new(),
            release: String::new(),
            priority: None,
            installed: false,
            timestamp: 0,
        }
    }

    pub fn installed(label: &str) -> Self {
        Self {
            installed: true,
            ..Self::new(label)
        }
    }
}

/// One alternative of a dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTarget {
    pub name: String,
    #[serde(default)]
    pub op: CompareOp,
    #[serde(default)]
    pub version: String,
}

/// A dependency as read from an index; several targets form an Or-group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDependency {
    #[serde(rename = "type", default)]
    pub dep_type: DepType,
    pub targets: Vec<RawTarget>,
}

impl RawDependency {
    pub fn single(dep_type: DepType, name: &str, op: CompareOp, version: &str) -> Self {
        Self::or_group(dep_type, &[(name, op, version)])
    }

    pub fn or_group(dep_type: DepType, targets: &[(&str, CompareOp, &str)]) -> Self {
        Self {
            dep_type,
            targets: targets
                .iter()
                .map(|&(name, op, version)| RawTarget {
                    name: name.to_string(),
                    op,
                    version: version.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProvide {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl RawProvide {
    pub fn new(name: &str, version: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            version: version.map(str::to_string),
        }
    }
}

/// A package version as read from an index file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawVersionRecord {
    pub name: String,
    /// Full `[epoch:]version[-release]`
    pub version: String,
    #[serde(default = "default_arch")]
    pub arch: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub installed_size: u64,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub provides: Vec<RawProvide>,
    #[serde(default)]
    pub depends: Vec<RawDependency>,
    /// Precomputed version hash; computed by the cache builder when absent
    #[serde(default)]
    pub hash: Option<u32>,
}

fn default_arch() -> String {
    "noarch".to_string()
}

impl RawVersionRecord {
    pub fn new(name: &str, version: &str, arch: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            arch: arch.to_string(),
            size: 0,
            installed_size: 0,
            location: None,
            provides: Vec::new(),
            depends: Vec::new(),
            hash: None,
        }
    }
}

/// Supported index formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// repomd `primary.xml`, plain or gzip-compressed
    RepomdXml,
    /// repomd `primary.sqlite`
    RepomdSqlite,
    /// JSON list of [`RawVersionRecord`]s
    Json,
}

impl IndexFormat {
    pub fn label(&self) -> &'static str {
        match self {
            Self::RepomdXml => "repomd-xml",
            Self::RepomdSqlite => "repomd-sqlite",
            Self::Json => "json",
        }
    }

    /// Read every record of an index file in this format
    pub fn parse(&self, path: &Path) -> Result<Vec<RawVersionRecord>> {
        match self {
            Self::RepomdXml => repomd::parse_primary_file(path),
            Self::RepomdSqlite => sqlite::parse_primary_db(path),
            Self::Json => json::parse_records(path),
        }
    }
}

/// Maps format labels used in configuration to formats
#[derive(Debug, Clone)]
pub struct IndexRegistry {
    formats: HashMap<String, IndexFormat>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self {
            formats: HashMap::new(),
        }
    }

    /// Registry with every built-in format under its own label
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for format in [IndexFormat::RepomdXml, IndexFormat::RepomdSqlite, IndexFormat::Json] {
            registry.register(format.label(), format);
        }
        registry
    }

    pub fn register(&mut self, label: &str, format: IndexFormat) {
        self.formats.insert(label.to_string(), format);
    }

    pub fn lookup(&self, label: &str) -> Result<IndexFormat> {
        self.formats
            .get(label)
            .copied()
            .ok_or_else(|| Error::NotFoundError(format!("index format '{}'", label)))
    }

    pub fn open(&self, label: &str, path: &Path, meta: PackageFileMetadata) -> Result<IndexFile> {
        Ok(IndexFile {
            format: self.lookup(label)?,
            path: path.to_path_buf(),
            meta,
        })
    }
}

impl Default for IndexRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// A configured index file ready to be merged into a cache
#[derive(Debug, Clone)]
pub struct IndexFile {
    pub format: IndexFormat,
    pub path: PathBuf,
    pub meta: PackageFileMetadata,
}

impl IndexFile {
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Size on disk in bytes
    pub fn size(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Modification time in seconds since the epoch
    pub fn modified(&self) -> Result<i64> {
        file_mtime(&self.path)
    }

    pub fn records(&self) -> Result<Vec<RawVersionRecord>> {
        self.format.parse(&self.path)
    }

    /// Parse the file and merge its records into `builder`
    pub fn merge(&self, builder: &mut CacheBuilder, diag: &mut Diagnostics) -> Result<FileId> {
        let records = self.records()?;
        debug!(
            "Merging {} records from {} ({})",
            records.len(),
            self.path.display(),
            self.format.label()
        );
        let mut meta = self.meta.clone();
        if meta.timestamp == 0 {
            meta.timestamp = self.modified().unwrap_or(0);
        }
        builder.merge(meta, records, diag)
    }
}

/// Merge the installed snapshot and every configured source into `builder`,
/// in that order.
///
/// Missing index files are reported as warnings and skipped.
pub fn load_indexes(
    registry: &IndexRegistry,
    config: &Config,
    builder: &mut CacheBuilder,
    diag: &mut Diagnostics,
) -> Result<()> {
    let mut files = Vec::new();
    if let Some(ref installed) = config.installed {
        let meta = PackageFileMetadata::installed("installed");
        files.push(registry.open(&installed.format, &installed.path, meta)?);
    }
    for source in &config.sources {
        let meta = PackageFileMetadata {
            label: source.label.clone(),
            origin: source.origin.clone(),
            release: source.release.clone(),
            priority: source.priority,
            installed: false,
            timestamp: 0,
        };
        files.push(registry.open(&source.format, &source.path, meta)?);
    }

    for file in files {
        if !file.exists() {
            diag.warning(format!(
                "Index file {} for {} is missing",
                file.path.display(),
                file.meta.label
            ));
            continue;
        }
        file.merge(builder, diag)?;
    }
    Ok(())
}

fn file_mtime(path: &Path) -> Result<i64> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0))
}
