// src/error.rs

//! Error types for rapt

use thiserror::Error;

/// Main error type for rapt operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Not found: {0}")]
    NotFoundError(String),

    /// mark_install on a package the policy found nothing installable for
    #[error("Package {0} has no installation candidate")]
    NoCandidateVersion(String),

    #[error("Package {0} is a virtual package with no good providers")]
    NoProvider(String),

    #[error("Package {name} is a virtual package provided by: {}", providers.join(", "))]
    AmbiguousProvider { name: String, providers: Vec<String> },

    /// Both sides of a Conflicts/Obsoletes are protected
    #[error("Unresolvable conflict between {0} and {1}")]
    UnresolvableConflict(String, String),

    #[error("{count} packages remain broken after resolution:\n  {}", problems.join("\n  "))]
    BrokenAfterResolve { count: usize, problems: Vec<String> },

    #[error("Requested change for {0} could not be honored")]
    RequestNotHonored(String),

    /// Cycle among hard (pre-dependency or conflict) ordering edges
    #[error("Could not order {remaining} operations, cycle through: {}", packages.join(" -> "))]
    OrderingCycle { packages: Vec<String>, remaining: usize },

    #[error("Sub-process {program} returned an error code ({code})")]
    InstallerFailed { program: String, code: i32 },

    #[error("Archive for {0} is not available")]
    ArchiveMissing(String),

    #[error("Essential packages would be removed: {}", .0.join(", "))]
    EssentialRemoval(Vec<String>),

    #[error("Packages need to be removed but removal is disabled")]
    RemoveDisabled,

    #[error("Script error: {0}")]
    ScriptError(String),
}

/// Result type alias for rapt operations
pub type Result<T> = std::result::Result<T, Error>;
