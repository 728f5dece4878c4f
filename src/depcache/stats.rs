// src/depcache/stats.rs

//! Transaction summary

use super::{Change, DepCache, Mode};
use crate::cache::DepType;
use serde::Serialize;
use std::fmt;

/// Counts of the planned changes, as shown before applying them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub upgraded: usize,
    pub newly_installed: usize,
    pub reinstalled: usize,
    pub downgraded: usize,
    /// Removals caused by an Obsoletes of an installing package
    pub replaced: usize,
    pub removed: usize,
    pub not_upgraded: usize,
    pub broken: usize,
    pub download_size: u64,
    pub installed_size_delta: i64,
    /// (removed package, package replacing it)
    pub replaced_by: Vec<(String, String)>,
    /// Essential or important packages the transaction removes
    pub essential_removals: Vec<String>,
}

impl Stats {
    pub fn collect(depcache: &DepCache<'_>) -> Self {
        let cache = depcache.cache();
        let mut stats = Self {
            not_upgraded: depcache.keep_count(),
            broken: depcache.broken_count(),
            download_size: depcache.deb_size(),
            installed_size_delta: depcache.usr_size(),
            ..Default::default()
        };

        for pkg in cache.packages() {
            match depcache.change(pkg) {
                Some(Change::NewInstall) => stats.newly_installed += 1,
                Some(Change::Upgrade) => stats.upgraded += 1,
                Some(Change::Downgrade) => stats.downgraded += 1,
                Some(Change::Reinstall) => stats.reinstalled += 1,
                Some(Change::Remove) => match depcache.replaced_by(pkg) {
                    Some(by) => {
                        stats.replaced += 1;
                        stats
                            .replaced_by
                            .push((cache.name(pkg).to_string(), cache.name(by).to_string()));
                    }
                    None => stats.removed += 1,
                },
                None => {}
            }
        }

        stats.essential_removals = essential_removals(depcache);
        stats
    }

    pub fn has_changes(&self) -> bool {
        self.upgraded
            + self.newly_installed
            + self.reinstalled
            + self.downgraded
            + self.replaced
            + self.removed
            > 0
    }
}

/// Removed packages flagged essential or important, and removed packages an
/// installed essential package depends on. Obsoleted packages do not count.
fn essential_removals(depcache: &DepCache<'_>) -> Vec<String> {
    let cache = depcache.cache();
    let removing = |pkg| depcache.mode(pkg) == Mode::Delete && depcache.replaced_by(pkg).is_none();
    let mut out: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        if !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    };

    for pkg in cache.packages() {
        let flags = cache.package(pkg).flags;
        if !(flags.essential || flags.important) {
            continue;
        }
        if removing(pkg) {
            push(cache.name(pkg));
            continue;
        }
        let Some(ver) = depcache.current(pkg) else {
            continue;
        };
        for &dep in &cache.version(ver).depends {
            let d = cache.dependency(dep);
            if matches!(d.dep_type, DepType::Depends | DepType::PreDepends) && removing(d.target) {
                push(cache.name(d.target));
            }
        }
    }
    out
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} upgraded, {} newly installed", self.upgraded, self.newly_installed)?;
        if self.reinstalled > 0 {
            write!(f, ", {} reinstalled", self.reinstalled)?;
        }
        if self.downgraded > 0 {
            write!(f, ", {} downgraded", self.downgraded)?;
        }
        write!(
            f,
            ", {} replaced, {} removed and {} not upgraded.",
            self.replaced, self.removed, self.not_upgraded
        )?;
        if self.broken > 0 {
            write!(f, " {} broken.", self.broken)?;
        }
        Ok(())
    }
}
