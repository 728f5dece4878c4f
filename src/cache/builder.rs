// src/cache/builder.rs

//! Package cache construction
//!
//! Index files are merged one at a time. Packages are unique by name: a
//! name first seen only as a dependency target or a provide becomes a
//! concrete package as soon as a version of it is merged. Versions are
//! unique by (package, version, arch); when two files carry the same
//! version their version hashes decide whether they are the same build.

use super::{
    DepId, Dependency, FileId, Package, PackageCache, PackageFile, PkgId, PrvId, Provide, VerId,
    Version, version_hash,
};
use crate::config::{Config, PackagePatterns, SchemeKind};
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::index::{IndexRegistry, PackageFileMetadata, RawVersionRecord, load_indexes};
use crate::version::{ArchTable, RpmVersion, VersionScheme};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, info};

/// Incrementally builds a [`PackageCache`]
pub struct CacheBuilder {
    cache: PackageCache,
    patterns: PackagePatterns,
    by_key: HashMap<(PkgId, String, String), VerId>,
}

impl CacheBuilder {
    pub fn new(scheme: VersionScheme, arches: ArchTable, patterns: PackagePatterns) -> Self {
        Self {
            cache: PackageCache::empty(scheme, arches),
            patterns,
            by_key: HashMap::new(),
        }
    }

    /// Merge the records of one index file
    pub fn merge(
        &mut self,
        meta: PackageFileMetadata,
        records: Vec<RawVersionRecord>,
        diag: &mut Diagnostics,
    ) -> Result<FileId> {
        let file = FileId(self.cache.files.len() as u32);
        let installed = meta.installed;
        self.cache.files.push(PackageFile {
            label: meta.label,
            origin: meta.origin,
            release: meta.release,
            priority: meta.priority,
            installed,
            timestamp: meta.timestamp,
        });

        for record in records {
            if self.patterns.is_ignored(&record.name) {
                debug!("Ignoring {} {}", record.name, record.version);
                continue;
            }
            self.validate(&record)?;
            self.merge_record(file, installed, record, diag);
        }
        Ok(file)
    }

    fn validate(&self, record: &RawVersionRecord) -> Result<()> {
        if record.name.is_empty() {
            return Err(Error::ParseError(format!(
                "Package record without a name (version '{}')",
                record.version
            )));
        }
        if let VersionScheme::Rpm { .. } = self.cache.scheme {
            RpmVersion::parse(&record.version)?;
        } else if record.version.is_empty() {
            return Err(Error::ParseError(format!("Package {} has no version", record.name)));
        }
        Ok(())
    }

    fn merge_record(
        &mut self,
        file: FileId,
        installed: bool,
        record: RawVersionRecord,
        diag: &mut Diagnostics,
    ) {
        let name = if self.patterns.is_duplicated_allowed(&record.name) {
            format!("{}#{}", record.name, record.version)
        } else {
            record.name.clone()
        };
        let pkg = self.get_or_create(&name);
        let hash = record.hash.unwrap_or_else(|| version_hash(&record));
        let key = (pkg, record.version.clone(), record.arch.clone());

        let ver = match self.by_key.get(&key).copied() {
            Some(ver) if self.cache.versions[ver.index()].hash == hash => {
                self.attach_file(ver, file);
                ver
            }
            Some(ver) => {
                let file_ts = self.cache.files[file.index()].timestamp;
                let existing_ts = self.cache.versions[ver.index()]
                    .files
                    .iter()
                    .map(|f| self.cache.files[f.index()].timestamp)
                    .max()
                    .unwrap_or(i64::MIN);

                self.cache.packages[pkg.index()].flags.duplicated = true;
                let winner = if file_ts >= existing_ts {
                    self.detach_payload(ver);
                    self.attach_payload(ver, &record, hash);
                    let files = &self.cache.files;
                    self.cache.versions[ver.index()]
                        .files
                        .retain(|f| files[f.index()].installed);
                    self.attach_file(ver, file);
                    self.cache.files[file.index()].label.clone()
                } else {
                    if installed {
                        self.attach_file(ver, file);
                    }
                    let first = self.cache.versions[ver.index()].files[0];
                    self.cache.files[first.index()].label.clone()
                };
                diag.warning(format!(
                    "Package {} {}.{} has conflicting definitions, using the one from {}",
                    record.name, record.version, record.arch, winner
                ));
                ver
            }
            None => {
                let ver = self.add_version(pkg, &record, hash);
                self.attach_file(ver, file);
                self.by_key.insert(key, ver);
                ver
            }
        };

        if installed {
            let current = self.cache.packages[pkg.index()].current;
            match current {
                Some(cur) if cur != ver => {
                    diag.warning(format!("Package {} is installed more than once", record.name));
                    let cur_version = &self.cache.versions[cur.index()].version;
                    if self.cache.scheme.compare(&record.version, cur_version) == Ordering::Greater {
                        self.cache.packages[pkg.index()].current = Some(ver);
                    }
                }
                _ => self.cache.packages[pkg.index()].current = Some(ver),
            }
        }
    }

    fn get_or_create(&mut self, name: &str) -> PkgId {
        if let Some(&id) = self.cache.names.get(name) {
            return id;
        }
        let id = PkgId(self.cache.packages.len() as u32);
        self.cache.packages.push(Package {
            name: name.to_string(),
            versions: Vec::new(),
            current: None,
            provided_by: Vec::new(),
            rev_depends: Vec::new(),
            flags: Default::default(),
        });
        self.cache.names.insert(name.to_string(), id);
        id
    }

    fn add_version(&mut self, pkg: PkgId, record: &RawVersionRecord, hash: u32) -> VerId {
        let ver = VerId(self.cache.versions.len() as u32);
        self.cache.versions.push(Version {
            package: pkg,
            version: record.version.clone(),
            arch: record.arch.clone(),
            size: 0,
            installed_size: 0,
            location: None,
            depends: Vec::new(),
            provides: Vec::new(),
            files: Vec::new(),
            hash,
        });
        self.cache.packages[pkg.index()].versions.push(ver);
        self.attach_payload(ver, record, hash);
        ver
    }

    fn attach_file(&mut self, ver: VerId, file: FileId) {
        let files = &mut self.cache.versions[ver.index()].files;
        if !files.contains(&file) {
            files.push(file);
        }
    }

    /// Add the provides and dependencies of `record` to `ver`
    fn attach_payload(&mut self, ver: VerId, record: &RawVersionRecord, hash: u32) {
        {
            let v = &mut self.cache.versions[ver.index()];
            v.size = record.size;
            v.installed_size = record.installed_size;
            v.location = record.location.clone();
            v.hash = hash;
        }

        let pkg = self.cache.versions[ver.index()].package;
        let mut provides: Vec<(String, Option<String>)> = record
            .provides
            .iter()
            .map(|p| (p.name.clone(), p.version.clone()))
            .collect();
        // Multi-version packages answer to their plain name
        if self.cache.packages[pkg.index()].name.contains('#') {
            provides.push((record.name.clone(), Some(record.version.clone())));
        }

        for (name, version) in provides {
            let target = self.get_or_create(&name);
            let id = PrvId(self.cache.provides.len() as u32);
            self.cache.provides.push(Provide {
                owner: ver,
                name: target,
                version,
            });
            self.cache.packages[target.index()].provided_by.push(id);
            self.cache.versions[ver.index()].provides.push(id);
        }

        for dep in &record.depends {
            let count = dep.targets.len();
            for (i, t) in dep.targets.iter().enumerate() {
                let target = self.get_or_create(&t.name);
                let id = DepId(self.cache.deps.len() as u32);
                self.cache.deps.push(Dependency {
                    owner: ver,
                    target,
                    op: t.op,
                    target_version: t.version.clone(),
                    dep_type: dep.dep_type,
                    or_next: i + 1 < count,
                });
                self.cache.packages[target.index()].rev_depends.push(id);
                self.cache.versions[ver.index()].depends.push(id);
            }
        }
    }

    /// Unlink the provides and dependencies of `ver` from their targets
    fn detach_payload(&mut self, ver: VerId) {
        let depends = std::mem::take(&mut self.cache.versions[ver.index()].depends);
        for dep in depends {
            let target = self.cache.deps[dep.index()].target;
            self.cache.packages[target.index()]
                .rev_depends
                .retain(|&d| d != dep);
        }
        let provides = std::mem::take(&mut self.cache.versions[ver.index()].provides);
        for prv in provides {
            let target = self.cache.provides[prv.index()].name;
            self.cache.packages[target.index()]
                .provided_by
                .retain(|&p| p != prv);
        }
    }

    /// Sort version lists and apply name-based flags
    pub fn finish(mut self) -> PackageCache {
        let cache = &mut self.cache;
        let scheme = cache.scheme;
        let versions = &cache.versions;
        let arches = &cache.arches;

        for pkg in cache.packages.iter_mut() {
            pkg.versions.sort_by(|&a, &b| {
                let va = &versions[a.index()];
                let vb = &versions[b.index()];
                scheme
                    .compare_with_arch(&vb.version, &vb.arch, &va.version, &va.arch, arches)
                    .then_with(|| va.files.first().cmp(&vb.files.first()))
            });

            let base = pkg.name.split_once('#').map_or(pkg.name.as_str(), |(b, _)| b);
            pkg.flags.essential = self.patterns.essential.iter().any(|e| e == base);
            pkg.flags.important = self.patterns.important.iter().any(|e| e == base);
        }

        info!(
            "Package cache: {} packages, {} versions, {} dependencies from {} files",
            cache.packages.len(),
            cache.versions.len(),
            cache.deps.len(),
            cache.files.len()
        );
        self.cache
    }
}

/// Build the cache from the installed snapshot and every configured source.
///
/// Missing index files are reported as warnings and skipped.
pub fn build_cache(
    config: &Config,
    registry: &IndexRegistry,
    diag: &mut Diagnostics,
) -> Result<PackageCache> {
    let scheme = match config.policy.scheme {
        SchemeKind::Rpm => VersionScheme::Rpm {
            no_promote: config.policy.no_promote,
        },
        SchemeKind::Debian => VersionScheme::Debian,
    };
    let arches = ArchTable::new(config.policy.architectures.clone());
    let patterns = PackagePatterns::compile(&config.packages)?;
    let mut builder = CacheBuilder::new(scheme, arches, patterns);

    load_indexes(registry, config, &mut builder, diag)?;

    Ok(builder.finish())
}
