// src/config.rs

//! Configuration file parsing
//!
//! rapt reads a single TOML file (default [`DEFAULT_CONFIG_PATH`]). Every
//! section is optional and falls back to the built-in defaults:
//!
//! ```toml
//! [rpm]
//! interactive = false
//! options = ["--excludedocs"]
//!
//! [resolver]
//! remove_depends = true
//!
//! [policy]
//! target_release = "40"
//! architectures = ["x86_64", "i686", "noarch"]
//!
//! [policy.pins]
//! openssl = "3.0.*"
//!
//! [packages]
//! hold = ["^kernel$"]
//! allow_duplicated = ["^kernel$", "^kernel-devel$"]
//!
//! [[source]]
//! label = "fedora"
//! format = "repomd-xml"
//! path = "/var/lib/rapt/lists/fedora-primary.xml.gz"
//! release = "40"
//!
//! [installed]
//! format = "json"
//! path = "/var/lib/rapt/status.json"
//! ```

use crate::error::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/rapt/rapt.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rpm: RpmConfig,
    pub resolver: ResolverConfig,
    pub policy: PolicyConfig,
    pub packages: PackagesConfig,
    pub apply: ApplyConfig,

    /// Package index files, in declaration order
    #[serde(rename = "source")]
    pub sources: Vec<SourceConfig>,

    /// Installed-package snapshot
    pub installed: Option<InstalledConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load the file if it exists, otherwise use defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Settings for the rpm invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpmConfig {
    /// rpm binary to execute
    pub binary: String,
    /// Alternative install root passed as `-r`
    pub root_dir: Option<String>,
    /// Interactive runs get hash marks, others get `--percent`
    pub interactive: bool,
    /// Let rpm reorder the transaction itself (omit `--noorder`)
    pub order: bool,
    /// Options added to every invocation
    pub options: Vec<String>,
    pub install_options: Vec<String>,
    pub erase_options: Vec<String>,
    /// Above this many package files, pass them through a temporary list file
    pub file_list_threshold: usize,
    /// Split runs into invocations of at most this many packages (0 = unlimited)
    pub max_batch_size: usize,
    /// Working directory for hook scripts
    pub run_directory: String,
    /// Shell commands run before the transaction
    pub pre_invoke: Vec<String>,
    /// Shell commands run after the transaction
    pub post_invoke: Vec<String>,
    /// Shell commands receiving the archive paths on stdin
    pub pre_install_pkgs: Vec<String>,
    pub script_timeout_secs: u64,
    /// Log the rpm command line instead of running it
    pub debug_dry_run: bool,
}

impl Default for RpmConfig {
    fn default() -> Self {
        Self {
            binary: "rpm".to_string(),
            root_dir: None,
            interactive: true,
            order: false,
            options: Vec::new(),
            install_options: Vec::new(),
            erase_options: Vec::new(),
            file_list_threshold: 50,
            max_batch_size: 0,
            run_directory: "/".to_string(),
            pre_invoke: Vec::new(),
            post_invoke: Vec::new(),
            pre_install_pkgs: Vec::new(),
            script_timeout_secs: 300,
            debug_dry_run: false,
        }
    }
}

/// Settings for the problem resolver and automatic installs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Cap on full resolver passes
    pub max_iterations: usize,
    /// Cascade removal to dependencies nothing else needs
    pub remove_depends: bool,
    /// Pull in dependencies when a package is marked for install
    pub auto_install: bool,
    /// Recursion bound for automatic installs
    pub max_install_depth: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            remove_depends: false,
            auto_install: true,
            max_install_depth: 100,
        }
    }
}

/// Version comparison rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemeKind {
    #[default]
    Rpm,
    Debian,
}

/// Candidate selection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Only consider versions from index files with this release
    pub target_release: Option<String>,
    /// Use unpinned selection when a pin matches nothing
    pub allow_fallback: bool,
    /// Priority of the installed-package snapshot
    pub installed_priority: i32,
    /// Priority of index files that do not set one
    pub default_priority: i32,
    /// Package name glob -> version glob
    pub pins: BTreeMap<String, String>,
    /// Allowed architectures, most preferred first. Empty allows everything.
    pub architectures: Vec<String>,
    pub scheme: SchemeKind,
    /// Do not promote a dependency without an epoch to match any epoch
    pub no_promote: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            target_release: None,
            allow_fallback: false,
            installed_priority: 100,
            default_priority: 500,
            pins: BTreeMap::new(),
            architectures: Vec::new(),
            scheme: SchemeKind::Rpm,
            no_promote: false,
        }
    }
}

/// Per-package behaviour selected by name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagesConfig {
    /// Regexes of packages kept at their installed version
    pub hold: Vec<String>,
    /// Regexes of packages that may have several versions installed
    pub allow_duplicated: Vec<String>,
    /// Regexes of package records skipped while loading indexes
    pub ignore: Vec<String>,
    pub essential: Vec<String>,
    pub important: Vec<String>,
}

/// Compiled form of [`PackagesConfig`]
#[derive(Debug, Clone, Default)]
pub struct PackagePatterns {
    pub hold: Vec<Regex>,
    pub allow_duplicated: Vec<Regex>,
    pub ignore: Vec<Regex>,
    pub essential: Vec<String>,
    pub important: Vec<String>,
}

impl PackagePatterns {
    pub fn compile(config: &PackagesConfig) -> Result<Self> {
        let compile = |list: &[String]| -> Result<Vec<Regex>> {
            list.iter()
                .map(|p| Regex::new(p).map_err(Into::into))
                .collect()
        };
        Ok(Self {
            hold: compile(&config.hold)?,
            allow_duplicated: compile(&config.allow_duplicated)?,
            ignore: compile(&config.ignore)?,
            essential: config.essential.clone(),
            important: config.important.clone(),
        })
    }

    pub fn is_held(&self, name: &str) -> bool {
        self.hold.iter().any(|r| r.is_match(name))
    }

    pub fn is_duplicated_allowed(&self, name: &str) -> bool {
        self.allow_duplicated.iter().any(|r| r.is_match(name))
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.iter().any(|r| r.is_match(name))
    }
}

/// Safety switches for applying a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyConfig {
    pub allow_remove: bool,
    pub allow_essential_removal: bool,
    /// Drop packages whose archives are missing instead of failing
    pub fix_missing: bool,
    /// Remove configuration files along with packages
    pub purge: bool,
    /// Reinstall packages already at their candidate version
    pub reinstall: bool,
    pub archives_dir: PathBuf,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            allow_remove: true,
            allow_essential_removal: false,
            fix_missing: false,
            purge: false,
            reinstall: false,
            archives_dir: PathBuf::from("/var/cache/rapt/archives"),
        }
    }
}

/// A package index file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub label: String,
    /// Registered index format (`repomd-xml`, `repomd-sqlite`, `json`)
    pub format: String,
    pub path: PathBuf,
    /// Overrides `policy.default_priority`
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub release: String,
}

/// Where the installed-package snapshot lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledConfig {
    #[serde(default = "default_installed_format")]
    pub format: String,
    pub path: PathBuf,
}

fn default_installed_format() -> String {
    "json".to_string()
}
