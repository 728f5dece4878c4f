// src/cache/mod.rs

//! In-memory package database
//!
//! The cache is a set of arenas (packages, versions, dependencies, provides
//! and index files) addressed by small typed ids. It is built once by
//! [`CacheBuilder`] from the configured index files and is read-only
//! afterwards; all planning state lives in the `DepCache` overlay.

mod builder;
mod hash;

pub use builder::{CacheBuilder, build_cache};
pub use hash::version_hash;

use crate::version::{ArchTable, CompareOp, VersionScheme};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use strum_macros::Display;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(
    /// Index of a package in the cache
    PkgId
);
arena_id!(
    /// Index of a version in the cache
    VerId
);
arena_id!(DepId);
arena_id!(PrvId);
arena_id!(
    /// Index of a loaded index file
    FileId
);

/// Relationship kind of a dependency
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "PascalCase")]
pub enum DepType {
    #[default]
    Depends,
    PreDepends,
    Recommends,
    Suggests,
    Conflicts,
    Replaces,
    Obsoletes,
}

impl DepType {
    /// Dependencies that make a package broken when violated
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            Self::Depends | Self::PreDepends | Self::Conflicts | Self::Obsoletes
        )
    }

    /// Dependencies that must *not* be satisfied
    pub fn is_negative(self) -> bool {
        matches!(self, Self::Conflicts | Self::Obsoletes)
    }
}

/// Flags attached to a package by name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackageFlags {
    pub essential: bool,
    pub important: bool,
    /// Conflicting definitions of the same version were seen
    pub duplicated: bool,
}

#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    /// Versions, highest first
    pub versions: Vec<VerId>,
    pub current: Option<VerId>,
    /// Provides naming this package
    pub provided_by: Vec<PrvId>,
    /// Dependencies targeting this package
    pub rev_depends: Vec<DepId>,
    pub flags: PackageFlags,
}

#[derive(Debug, Clone)]
pub struct Version {
    pub package: PkgId,
    pub version: String,
    pub arch: String,
    pub size: u64,
    pub installed_size: u64,
    /// Archive path relative to the repository, if the index knew it
    pub location: Option<String>,
    pub depends: Vec<DepId>,
    pub provides: Vec<PrvId>,
    /// Index files carrying this version, in load order
    pub files: Vec<FileId>,
    pub hash: u32,
}

#[derive(Debug, Clone)]
pub struct Dependency {
    pub owner: VerId,
    pub target: PkgId,
    pub op: CompareOp,
    pub target_version: String,
    pub dep_type: DepType,
    /// The next dependency of the owner is an alternative to this one
    pub or_next: bool,
}

#[derive(Debug, Clone)]
pub struct Provide {
    pub owner: VerId,
    pub name: PkgId,
    pub version: Option<String>,
}

/// An index file the cache was built from
#[derive(Debug, Clone)]
pub struct PackageFile {
    pub label: String,
    pub origin: String,
    pub release: String,
    /// Explicit priority, otherwise the policy default applies
    pub priority: Option<i32>,
    /// The installed-package snapshot
    pub installed: bool,
    pub timestamp: i64,
}

/// The package database
#[derive(Debug, Clone)]
pub struct PackageCache {
    pub(crate) packages: Vec<Package>,
    pub(crate) versions: Vec<Version>,
    pub(crate) deps: Vec<Dependency>,
    pub(crate) provides: Vec<Provide>,
    pub(crate) files: Vec<PackageFile>,
    pub(crate) names: HashMap<String, PkgId>,
    pub(crate) scheme: VersionScheme,
    pub(crate) arches: ArchTable,
}

impl PackageCache {
    pub(crate) fn empty(scheme: VersionScheme, arches: ArchTable) -> Self {
        Self {
            packages: Vec::new(),
            versions: Vec::new(),
            deps: Vec::new(),
            provides: Vec::new(),
            files: Vec::new(),
            names: HashMap::new(),
            scheme,
            arches,
        }
    }

    pub fn find_package(&self, name: &str) -> Option<PkgId> {
        self.names.get(name).copied()
    }

    pub fn packages(&self) -> impl Iterator<Item = PkgId> + '_ {
        (0..self.packages.len() as u32).map(PkgId)
    }

    pub fn package_count(&self) -> usize {
        self.packages.len()
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    pub fn package(&self, id: PkgId) -> &Package {
        &self.packages[id.index()]
    }

    pub fn version(&self, id: VerId) -> &Version {
        &self.versions[id.index()]
    }

    pub fn dependency(&self, id: DepId) -> &Dependency {
        &self.deps[id.index()]
    }

    pub fn provide(&self, id: PrvId) -> &Provide {
        &self.provides[id.index()]
    }

    pub fn file(&self, id: FileId) -> &PackageFile {
        &self.files[id.index()]
    }

    pub fn files(&self) -> impl Iterator<Item = (FileId, &PackageFile)> {
        self.files
            .iter()
            .enumerate()
            .map(|(i, f)| (FileId(i as u32), f))
    }

    pub fn scheme(&self) -> VersionScheme {
        self.scheme
    }

    pub fn arches(&self) -> &ArchTable {
        &self.arches
    }

    pub fn name(&self, pkg: PkgId) -> &str {
        &self.package(pkg).name
    }

    /// Name without the `#version` suffix of multi-version packages
    pub fn base_name(&self, pkg: PkgId) -> &str {
        let name = self.name(pkg);
        name.split_once('#').map_or(name, |(base, _)| base)
    }

    /// Parent package of a version
    pub fn owner(&self, ver: VerId) -> PkgId {
        self.version(ver).package
    }

    /// `name-version.arch`, for messages
    pub fn version_label(&self, ver: VerId) -> String {
        let v = self.version(ver);
        format!("{}-{}.{}", self.base_name(v.package), v.version, v.arch)
    }

    /// A package with no versions that something provides
    pub fn is_virtual(&self, pkg: PkgId) -> bool {
        let p = self.package(pkg);
        p.versions.is_empty() && !p.provided_by.is_empty()
    }

    /// Find a version of `pkg` by its version string
    pub fn find_version(&self, pkg: PkgId, version: &str) -> Option<VerId> {
        self.package(pkg)
            .versions
            .iter()
            .copied()
            .find(|&v| self.version(v).version == version)
    }

    /// Whether the version came from the installed-package snapshot
    pub fn is_installed_version(&self, ver: VerId) -> bool {
        self.version(ver)
            .files
            .iter()
            .any(|&f| self.file(f).installed)
    }

    /// Dependencies of a version grouped into Or-groups, in declaration order
    pub fn dep_groups(&self, ver: VerId) -> Vec<Vec<DepId>> {
        let mut groups = Vec::new();
        let mut current = Vec::new();
        for &dep in &self.version(ver).depends {
            current.push(dep);
            if !self.dependency(dep).or_next {
                groups.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            groups.push(current);
        }
        groups
    }

    /// Check a version string against a dependency's operator.
    ///
    /// An Obsoletes against an empty version never matches.
    pub fn check_dep(&self, ver_str: &str, dep: DepId) -> bool {
        let d = self.dependency(dep);
        if d.dep_type == DepType::Obsoletes && ver_str.is_empty() {
            return false;
        }
        self.scheme.check_dep(ver_str, d.op, &d.target_version)
    }

    /// Whether `ver` is a target of `dep`, by name or through a provide.
    ///
    /// Obsoletes only match real package names. Negative dependencies
    /// never match the package that declares them.
    pub fn dep_matches(&self, dep: DepId, ver: VerId) -> bool {
        let d = self.dependency(dep);
        let v = self.version(ver);
        let owner_pkg = self.owner(d.owner);

        if d.dep_type.is_negative() && v.package == owner_pkg {
            return false;
        }

        if v.package == d.target && self.check_dep(&v.version, dep) {
            return true;
        }

        if d.dep_type == DepType::Obsoletes {
            return false;
        }

        v.provides.iter().any(|&prv| {
            let p = self.provide(prv);
            p.name == d.target && self.provide_satisfies(prv, dep)
        })
    }

    /// Whether a provide satisfies the version part of a dependency on its name.
    ///
    /// Unversioned dependencies accept any provide; versioned ones need a
    /// versioned provide.
    pub fn provide_satisfies(&self, prv: PrvId, dep: DepId) -> bool {
        let d = self.dependency(dep);
        if d.op == CompareOp::Any {
            return true;
        }
        match &self.provide(prv).version {
            Some(pv) => self.check_dep(pv, dep),
            None => false,
        }
    }

    /// Every version in the cache matching a dependency
    pub fn all_targets(&self, dep: DepId) -> Vec<VerId> {
        let d = self.dependency(dep);
        let target = self.package(d.target);
        let mut out: Vec<VerId> = target
            .versions
            .iter()
            .copied()
            .filter(|&v| self.dep_matches(dep, v))
            .collect();

        if d.dep_type != DepType::Obsoletes {
            for &prv in &target.provided_by {
                let owner = self.provide(prv).owner;
                if !out.contains(&owner) && self.dep_matches(dep, owner) {
                    out.push(owner);
                }
            }
        }
        out
    }

    /// Versions providing `pkg`'s name
    pub fn providers(&self, pkg: PkgId) -> Vec<VerId> {
        let mut out = Vec::new();
        for &prv in &self.package(pkg).provided_by {
            let owner = self.provide(prv).owner;
            if !out.contains(&owner) {
                out.push(owner);
            }
        }
        out
    }

    /// Packages whose versions have a dependency that may be affected by
    /// a state change of `pkg`, directly or through a provided name
    pub fn affected_by(&self, pkg: PkgId) -> Vec<PkgId> {
        let mut out = Vec::new();
        let push_revs = |target: PkgId, out: &mut Vec<PkgId>| {
            for &dep in &self.package(target).rev_depends {
                let owner = self.owner(self.dependency(dep).owner);
                if !out.contains(&owner) {
                    out.push(owner);
                }
            }
        };
        push_revs(pkg, &mut out);
        for &ver in &self.package(pkg).versions {
            for &prv in &self.version(ver).provides {
                push_revs(self.provide(prv).name, &mut out);
            }
        }
        out
    }

    /// Human-readable form of a dependency: `Depends: foo (>= 1.0)`
    pub fn describe_dep(&self, dep: DepId) -> String {
        let d = self.dependency(dep);
        if d.op == CompareOp::Any {
            format!("{}: {}", d.dep_type, self.name(d.target))
        } else {
            format!(
                "{}: {} ({} {})",
                d.dep_type,
                self.name(d.target),
                d.op,
                d.target_version
            )
        }
    }
}

impl fmt::Display for PkgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
