// src/policy.rs

//! Candidate version selection
//!
//! The policy decides which version of a package would be installed. The
//! default rule picks the version with the highest index priority, then the
//! highest version, then the earliest index file. Version pins and a target
//! release narrow the eligible set first.

use crate::cache::{FileId, PackageCache, PkgId, VerId};
use crate::config::PolicyConfig;
use crate::error::{Error, Result};
use glob::Pattern;
use std::cmp::Ordering;
use tracing::debug;

/// A version pin: packages matching `name` may only use versions matching `version`
#[derive(Debug, Clone)]
pub struct Pin {
    pub name: Pattern,
    pub version: Pattern,
}

impl Pin {
    pub fn new(name: &str, version: &str) -> Result<Self> {
        let compile = |p: &str| {
            Pattern::new(p).map_err(|e| Error::ParseError(format!("Invalid pin '{}': {}", p, e)))
        };
        Ok(Self {
            name: compile(name)?,
            version: compile(version)?,
        })
    }

    /// Match the full version string or the version without its epoch
    pub fn matches_version(&self, version: &str) -> bool {
        if self.version.matches(version) {
            return true;
        }
        match version.split_once(':') {
            Some((_, rest)) => self.version.matches(rest),
            None => false,
        }
    }
}

/// Candidate selector
#[derive(Debug, Clone)]
pub struct Policy {
    pins: Vec<Pin>,
    target_release: Option<String>,
    allow_fallback: bool,
    installed_priority: i32,
    default_priority: i32,
}

impl Policy {
    pub fn new(config: &PolicyConfig) -> Result<Self> {
        let pins = config
            .pins
            .iter()
            .map(|(name, version)| Pin::new(name, version))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            pins,
            target_release: config.target_release.clone().filter(|r| !r.is_empty()),
            allow_fallback: config.allow_fallback,
            installed_priority: config.installed_priority,
            default_priority: config.default_priority,
        })
    }

    pub fn add_pin(&mut self, pin: Pin) {
        self.pins.push(pin);
    }

    pub fn pin_for(&self, name: &str) -> Option<&Pin> {
        self.pins.iter().find(|p| p.name.matches(name))
    }

    pub fn file_priority(&self, cache: &PackageCache, file: FileId) -> i32 {
        let f = cache.file(file);
        f.priority.unwrap_or(if f.installed {
            self.installed_priority
        } else {
            self.default_priority
        })
    }

    /// Priority of a version: the best priority among its index files
    pub fn priority(&self, cache: &PackageCache, ver: VerId) -> i32 {
        cache
            .version(ver)
            .files
            .iter()
            .map(|&f| self.file_priority(cache, f))
            .max()
            .unwrap_or(self.default_priority)
    }

    /// The candidate version of `pkg`, if any version is eligible
    pub fn select(&self, cache: &PackageCache, pkg: PkgId) -> Option<VerId> {
        let eligible: Vec<VerId> = cache
            .package(pkg)
            .versions
            .iter()
            .copied()
            .filter(|&v| cache.arches().is_compatible(&cache.version(v).arch))
            .collect();
        if eligible.is_empty() {
            return None;
        }

        let mut narrowed = eligible.clone();
        let mut restricted = false;
        if let Some(pin) = self.pin_for(cache.base_name(pkg)) {
            narrowed.retain(|&v| pin.matches_version(&cache.version(v).version));
            restricted = true;
        }
        if let Some(ref release) = self.target_release {
            narrowed.retain(|&v| {
                cache
                    .version(v)
                    .files
                    .iter()
                    .any(|&f| &cache.file(f).release == release)
            });
            restricted = true;
        }

        let pool = if restricted && narrowed.is_empty() {
            if !self.allow_fallback {
                debug!("No version of {} matches the pins", cache.name(pkg));
                return None;
            }
            debug!("Pins match nothing for {}, falling back", cache.name(pkg));
            eligible
        } else {
            narrowed
        };

        pool.into_iter().max_by(|&a, &b| self.compare_candidates(cache, a, b))
    }

    fn compare_candidates(&self, cache: &PackageCache, a: VerId, b: VerId) -> Ordering {
        let va = cache.version(a);
        let vb = cache.version(b);
        self.priority(cache, a)
            .cmp(&self.priority(cache, b))
            .then_with(|| {
                cache
                    .scheme()
                    .compare_with_arch(&va.version, &va.arch, &vb.version, &vb.arch, cache.arches())
            })
            // Earlier index files win
            .then_with(|| vb.files.first().cmp(&va.files.first()))
    }

    /// Explicit `name=version` selection, ignoring priorities and pins
    pub fn find_version(&self, cache: &PackageCache, pkg: PkgId, version: &str) -> Option<VerId> {
        let scheme = cache.scheme();
        cache.find_version(pkg, version).or_else(|| {
            cache
                .package(pkg)
                .versions
                .iter()
                .copied()
                .find(|&v| scheme.compare(&cache.version(v).version, version) == Ordering::Equal)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheBuilder;
    use crate::config::PackagePatterns;
    use crate::diagnostics::Diagnostics;
    use crate::index::{PackageFileMetadata, RawVersionRecord};
    use crate::version::{ArchTable, VersionScheme};

    fn meta(label: &str, priority: Option<i32>, release: &str) -> PackageFileMetadata {
        PackageFileMetadata {
            priority,
            release: release.to_string(),
            ..PackageFileMetadata::new(label)
        }
    }

    fn rec(version: &str, arch: &str) -> RawVersionRecord {
        RawVersionRecord::new("foo", version, arch)
    }

    fn cache_with(files: Vec<(PackageFileMetadata, Vec<RawVersionRecord>)>, arches: &[&str]) -> PackageCache {
        let mut builder = CacheBuilder::new(
            VersionScheme::default(),
            ArchTable::new(arches.iter().map(|a| a.to_string()).collect()),
            PackagePatterns::default(),
        );
        let mut diag = Diagnostics::new();
        for (meta, records) in files {
            builder.merge(meta, records, &mut diag).unwrap();
        }
        builder.finish()
    }

    fn selected(policy: &Policy, cache: &PackageCache) -> Option<String> {
        let foo = cache.find_package("foo").unwrap();
        policy
            .select(cache, foo)
            .map(|v| cache.version(v).version.clone())
    }

    #[test]
    fn test_highest_version_by_default() {
        let cache = cache_with(
            vec![(meta("repo", None, ""), vec![rec("1.0-1", "x86_64"), rec("2.0-1", "x86_64")])],
            &[],
        );
        let policy = Policy::new(&PolicyConfig::default()).unwrap();
        assert_eq!(selected(&policy, &cache).as_deref(), Some("2.0-1"));
    }

    #[test]
    fn test_priority_beats_version() {
        let cache = cache_with(
            vec![
                (meta("stable", Some(900), ""), vec![rec("1.0-1", "x86_64")]),
                (meta("testing", Some(100), ""), vec![rec("2.0-1", "x86_64")]),
            ],
            &[],
        );
        let policy = Policy::new(&PolicyConfig::default()).unwrap();
        assert_eq!(selected(&policy, &cache).as_deref(), Some("1.0-1"));
    }

    #[test]
    fn test_installed_priority_is_lower_than_default() {
        let cache = cache_with(
            vec![
                (PackageFileMetadata::installed("status"), vec![rec("1.0-1", "x86_64")]),
                (meta("repo", None, ""), vec![rec("1.1-1", "x86_64")]),
            ],
            &[],
        );
        let policy = Policy::new(&PolicyConfig::default()).unwrap();
        let foo = cache.find_package("foo").unwrap();
        let current = cache.package(foo).current.unwrap();
        assert_eq!(policy.priority(&cache, current), 100);
        assert_eq!(selected(&policy, &cache).as_deref(), Some("1.1-1"));
    }

    #[test]
    fn test_arch_filter_and_preference() {
        let cache = cache_with(
            vec![(
                meta("repo", None, ""),
                vec![rec("1.0-1", "i686"), rec("1.0-1", "x86_64"), rec("3.0-1", "ppc64le")],
            )],
            &["x86_64", "i686", "noarch"],
        );
        let policy = Policy::new(&PolicyConfig::default()).unwrap();
        let foo = cache.find_package("foo").unwrap();
        let cand = policy.select(&cache, foo).unwrap();
        assert_eq!(cache.version(cand).version, "1.0-1");
        assert_eq!(cache.version(cand).arch, "x86_64");
    }

    #[test]
    fn test_pin_narrows_and_fallback() {
        let cache = cache_with(
            vec![(meta("repo", None, ""), vec![rec("1:3.0.7-1", "x86_64"), rec("1:3.1.0-1", "x86_64")])],
            &[],
        );
        let mut config = PolicyConfig::default();
        config.pins.insert("fo*".to_string(), "3.0.*".to_string());
        let policy = Policy::new(&config).unwrap();
        assert_eq!(selected(&policy, &cache).as_deref(), Some("1:3.0.7-1"));

        config.pins.insert("fo*".to_string(), "9.*".to_string());
        let policy = Policy::new(&config).unwrap();
        assert_eq!(selected(&policy, &cache), None);

        config.allow_fallback = true;
        let policy = Policy::new(&config).unwrap();
        assert_eq!(selected(&policy, &cache).as_deref(), Some("1:3.1.0-1"));
    }

    #[test]
    fn test_target_release() {
        let cache = cache_with(
            vec![
                (meta("f40", None, "40"), vec![rec("1.0-1", "x86_64")]),
                (meta("rawhide", None, "41"), vec![rec("2.0-1", "x86_64")]),
            ],
            &[],
        );
        let config = PolicyConfig {
            target_release: Some("40".to_string()),
            ..Default::default()
        };
        let policy = Policy::new(&config).unwrap();
        assert_eq!(selected(&policy, &cache).as_deref(), Some("1.0-1"));
    }

    #[test]
    fn test_origin_order_breaks_ties() {
        let mut a = rec("1.0-1", "x86_64");
        a.size = 1;
        let mut b = rec("1.0-1", "noarch");
        b.size = 2;
        let cache = cache_with(
            vec![(meta("first", None, ""), vec![a]), (meta("second", None, ""), vec![b])],
            &[],
        );
        let policy = Policy::new(&PolicyConfig::default()).unwrap();
        let foo = cache.find_package("foo").unwrap();
        let cand = policy.select(&cache, foo).unwrap();
        assert_eq!(cache.version(cand).size, 1);
    }

    #[test]
    fn test_find_version_explicit() {
        let cache = cache_with(
            vec![(meta("repo", None, ""), vec![rec("1.0-1", "x86_64"), rec("2.0-1", "x86_64")])],
            &[],
        );
        let policy = Policy::new(&PolicyConfig::default()).unwrap();
        let foo = cache.find_package("foo").unwrap();
        let v = policy.find_version(&cache, foo, "1.0-1").unwrap();
        assert_eq!(cache.version(v).version, "1.0-1");
        let v = policy.find_version(&cache, foo, "0:1.0-1").unwrap();
        assert_eq!(cache.version(v).version, "1.0-1");
        assert!(policy.find_version(&cache, foo, "3.0").is_none());
    }

    #[test]
    fn test_invalid_pin() {
        let mut config = PolicyConfig::default();
        config.pins.insert("foo".to_string(), "[".to_string());
        assert!(Policy::new(&config).is_err());
    }
}
