// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use rapt::cache::{DepType, build_cache};
use rapt::config::Config;
use rapt::diagnostics::Diagnostics;
use rapt::index::{IndexRegistry, RawDependency, RawProvide, RawVersionRecord, write_records};
use rapt::version::CompareOp;
use rapt::PackageCache;
use std::path::PathBuf;
use tempfile::TempDir;

pub fn record(name: &str, version: &str) -> RawVersionRecord {
    RawVersionRecord::new(name, version, "x86_64")
}

/// Add a single-target dependency to `record`
pub fn with_dep(
    mut record: RawVersionRecord,
    dep_type: DepType,
    name: &str,
    op: CompareOp,
    version: &str,
) -> RawVersionRecord {
    record
        .depends
        .push(RawDependency::single(dep_type, name, op, version));
    record
}

pub fn with_provide(mut record: RawVersionRecord, name: &str) -> RawVersionRecord {
    record.provides.push(RawProvide::new(name, None));
    record
}

/// Write an installed snapshot, one repository and a configuration file
/// referencing both.
///
/// Returns (TempDir, Config) - keep the TempDir alive to prevent cleanup.
pub fn setup_system(
    installed: &[RawVersionRecord],
    available: &[RawVersionRecord],
) -> (TempDir, Config) {
    let temp_dir = tempfile::tempdir().unwrap();
    let status = temp_dir.path().join("status.json");
    let primary = temp_dir.path().join("fedora-primary.json");
    let archives = temp_dir.path().join("archives");
    write_records(&status, installed).unwrap();
    write_records(&primary, available).unwrap();
    std::fs::create_dir_all(&archives).unwrap();

    let config_path = temp_dir.path().join("rapt.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[apply]
archives_dir = "{}"

[installed]
path = "{}"

[[source]]
label = "fedora"
format = "json"
path = "{}"
release = "40"
"#,
            archives.display(),
            status.display(),
            primary.display()
        ),
    )
    .unwrap();

    let config = Config::load(&config_path).unwrap();
    (temp_dir, config)
}

pub fn load_cache(config: &Config) -> PackageCache {
    let mut diag = Diagnostics::new();
    build_cache(config, &IndexRegistry::with_defaults(), &mut diag).unwrap()
}

/// Drop an empty archive named like the fetcher expects
pub fn add_archive(config: &Config, name: &str, version: &str) -> PathBuf {
    let path = config
        .apply
        .archives_dir
        .join(format!("{}-{}.x86_64.rpm", name, version));
    std::fs::write(&path, b"").unwrap();
    path
}
