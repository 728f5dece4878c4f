// src/pm/fetch.rs

//! Locating package archives

use crate::cache::{PackageCache, VerId};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Provides the local archive for a version that is going to be installed
pub trait ArchiveFetcher {
    fn fetch(&mut self, cache: &PackageCache, ver: VerId) -> Result<PathBuf>;
}

/// Archives already downloaded into a directory
#[derive(Debug, Clone)]
pub struct LocalArchives {
    dir: PathBuf,
}

impl LocalArchives {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name of the archive: the last component of the index location,
    /// or `name-version-release.arch.rpm`
    pub fn archive_name(cache: &PackageCache, ver: VerId) -> String {
        let v = cache.version(ver);
        if let Some(name) = v
            .location
            .as_deref()
            .and_then(|loc| loc.rsplit('/').next())
            .filter(|name| !name.is_empty())
        {
            return name.to_string();
        }
        let version = v.version.split_once(':').map_or(v.version.as_str(), |(_, rest)| rest);
        format!("{}-{}.{}.rpm", cache.base_name(v.package), version, v.arch)
    }
}

impl ArchiveFetcher for LocalArchives {
    fn fetch(&mut self, cache: &PackageCache, ver: VerId) -> Result<PathBuf> {
        let path = self.dir.join(Self::archive_name(cache, ver));
        if path.is_file() {
            debug!("Using archive {}", path.display());
            Ok(path)
        } else {
            Err(Error::ArchiveMissing(cache.version_label(ver)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::{build, record};

    #[test]
    fn test_archive_names() {
        let mut located = record("openssl", "1:3.1.1-4.fc40");
        located.location = Some("Packages/o/openssl-3.1.1-4.fc40.x86_64.rpm".to_string());
        let cache = build(vec![], vec![located, record("zlib", "1:1.3-1")]);
        let openssl = cache.package(cache.find_package("openssl").unwrap()).versions[0];
        let zlib = cache.package(cache.find_package("zlib").unwrap()).versions[0];

        assert_eq!(
            LocalArchives::archive_name(&cache, openssl),
            "openssl-3.1.1-4.fc40.x86_64.rpm"
        );
        assert_eq!(LocalArchives::archive_name(&cache, zlib), "zlib-1.3-1.x86_64.rpm");
    }

    #[test]
    fn test_fetch_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = build(vec![], vec![record("zlib", "1.3-1"), record("bzip2", "1.0.8-1")]);
        std::fs::write(dir.path().join("zlib-1.3-1.x86_64.rpm"), b"rpm").unwrap();
        let mut fetcher = LocalArchives::new(dir.path());

        let zlib = cache.package(cache.find_package("zlib").unwrap()).versions[0];
        let path = fetcher.fetch(&cache, zlib).unwrap();
        assert_eq!(path, dir.path().join("zlib-1.3-1.x86_64.rpm"));

        let bzip2 = cache.package(cache.find_package("bzip2").unwrap()).versions[0];
        assert!(matches!(fetcher.fetch(&cache, bzip2), Err(Error::ArchiveMissing(_))));
    }
}
