// src/resolver/mod.rs

//! Problem resolver
//!
//! Takes an arbitrary dependency cache state, for instance after several
//! independent install and remove requests, and repairs it until nothing
//! is broken. The algorithm is a greedy, score-driven heuristic:
//!
//! - packages are visited in descending score order;
//! - a conflict sacrifices the lower-scored side (keeping it back, or
//!   removing it);
//! - an unsatisfied dependency installs a satisfier, preferring installed
//!   alternatives, and otherwise gives up the dependent.
//!
//! Protected packages are never sacrificed, and a sacrificed package is
//! never brought back within the same run.

mod problem;
mod provider;
mod score;

pub use problem::describe as describe_problem;
pub use provider::{ProviderHook, good_providers, select_provider};
pub use score::{ESSENTIAL_BONUS, IMPORTANT_BONUS, dependents, score};

use crate::cache::{DepId, PkgId, VerId};
use crate::config::ResolverConfig;
use crate::depcache::{DepCache, Mode, StateView};
use crate::error::{Error, Result};
use std::collections::HashSet;
use tracing::{debug, info};

/// Outcome of a successful resolver run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Packages whose planned state differs from before the run
    pub changes: Vec<PkgId>,
    pub iterations: usize,
}

pub struct ProblemResolver<'d, 'a> {
    depcache: &'d mut DepCache<'a>,
    config: ResolverConfig,
    scores: Vec<i64>,
    sacrificed: HashSet<PkgId>,
}

impl<'d, 'a> ProblemResolver<'d, 'a> {
    pub fn new(depcache: &'d mut DepCache<'a>, config: &ResolverConfig) -> Self {
        Self {
            depcache,
            config: config.clone(),
            scores: Vec::new(),
            sacrificed: HashSet::new(),
        }
    }

    /// Never remove or change this package while resolving
    pub fn protect(&mut self, pkg: PkgId) {
        self.depcache.set_protected(pkg, true);
    }

    /// Re-assert the marks of every protected package
    pub fn install_protect(&mut self) -> Result<()> {
        let cache = self.depcache.cache();
        for pkg in cache.packages() {
            if !self.depcache.is_protected(pkg) {
                continue;
            }
            match self.depcache.mode(pkg) {
                Mode::Install => self.depcache.mark_install(pkg, false, 0)?,
                Mode::Delete => {
                    let purge = self.depcache.state(pkg).flags.purge;
                    self.depcache.mark_delete(pkg, purge);
                }
                Mode::Keep => self.depcache.mark_keep(pkg),
            }
        }
        Ok(())
    }

    /// Repair the planned state until no package is broken.
    ///
    /// With `broken_fix`, packages that are broken on the current system
    /// are first tried at their candidate version.
    pub fn resolve(&mut self, broken_fix: bool) -> Result<ResolveReport> {
        let start = self.capture();
        self.install_protect()?;
        let order = self.score_order();

        let mut iterations = 0;
        while iterations < self.config.max_iterations {
            iterations += 1;
            let mut progress = false;
            for &pkg in &order {
                if broken_fix && self.try_candidate(pkg)? {
                    progress = true;
                }
                if self.depcache.inst_broken(pkg) && self.fix_package(pkg)? {
                    progress = true;
                }
            }
            debug!(
                "Resolver pass {}: {} broken",
                iterations,
                self.depcache.broken_count()
            );
            if !progress || self.depcache.broken_count() == 0 {
                break;
            }
        }

        if self.config.remove_depends && self.depcache.broken_count() == 0 {
            self.remove_unneeded_depends();
        }
        self.finish(&start, iterations)
    }

    /// Repair breakage only by keeping packages back at their current version
    pub fn resolve_by_keep(&mut self) -> Result<ResolveReport> {
        let start = self.capture();
        let order = self.score_order();
        let cache = self.depcache.cache();

        let mut iterations = 0;
        while iterations < self.config.max_iterations {
            iterations += 1;
            let mut progress = false;
            for &pkg in &order {
                if !self.depcache.inst_broken(pkg) {
                    continue;
                }
                if self.depcache.mode(pkg) == Mode::Install && !self.depcache.is_protected(pkg) {
                    debug!("Keeping back {}", cache.name(pkg));
                    self.depcache.mark_keep(pkg);
                    progress = true;
                    continue;
                }
                for group in self.depcache.unsatisfied_groups(pkg, StateView::Inst) {
                    for &dep in &group {
                        for culprit in self.related_packages(dep) {
                            if self.depcache.mode(culprit) != Mode::Keep
                                && !self.depcache.is_protected(culprit)
                            {
                                debug!("Keeping back {} for {}", cache.name(culprit), cache.name(pkg));
                                self.depcache.mark_keep(culprit);
                                progress = true;
                            }
                        }
                    }
                }
            }
            if !progress {
                break;
            }
        }
        self.finish(&start, iterations)
    }

    fn capture(&self) -> Vec<(Mode, Option<VerId>)> {
        self.depcache
            .cache()
            .packages()
            .map(|pkg| (self.depcache.mode(pkg), self.depcache.inst_version(pkg)))
            .collect()
    }

    fn score_order(&mut self) -> Vec<PkgId> {
        self.scores = score::compute(&*self.depcache);
        let mut order: Vec<PkgId> = self.depcache.cache().packages().collect();
        order.sort_by(|a, b| self.scores[b.index()].cmp(&self.scores[a.index()]));
        order
    }

    fn score_of(&self, pkg: PkgId) -> i64 {
        self.scores.get(pkg.index()).copied().unwrap_or(0)
    }

    fn finish(&self, start: &[(Mode, Option<VerId>)], iterations: usize) -> Result<ResolveReport> {
        let cache = self.depcache.cache();
        let broken: Vec<PkgId> = cache
            .packages()
            .filter(|&pkg| self.depcache.inst_broken(pkg))
            .collect();
        if !broken.is_empty() {
            return Err(Error::BrokenAfterResolve {
                count: broken.len(),
                problems: broken
                    .iter()
                    .map(|&pkg| problem::describe(&*self.depcache, pkg))
                    .collect(),
            });
        }

        let changes: Vec<PkgId> = cache
            .packages()
            .filter(|&pkg| {
                start[pkg.index()] != (self.depcache.mode(pkg), self.depcache.inst_version(pkg))
            })
            .collect();
        info!(
            "Resolver finished after {} passes, {} packages changed",
            iterations,
            changes.len()
        );
        Ok(ResolveReport {
            changes,
            iterations,
        })
    }

    /// For a kept package broken on the current system, try its candidate
    fn try_candidate(&mut self, pkg: PkgId) -> Result<bool> {
        let dc = &mut *self.depcache;
        if dc.mode(pkg) != Mode::Keep
            || !dc.now_broken(pkg)
            || !dc.inst_broken(pkg)
            || dc.is_protected(pkg)
            || self.sacrificed.contains(&pkg)
            || dc.candidate(pkg).is_none()
            || dc.candidate(pkg) == dc.current(pkg)
        {
            return Ok(false);
        }
        let snapshot = dc.snapshot();
        dc.mark_install(pkg, true, 0)?;
        if dc.inst_broken(pkg) {
            dc.restore(snapshot);
            return Ok(false);
        }
        debug!("Upgrading broken {}", dc.cache().name(pkg));
        Ok(true)
    }

    fn fix_package(&mut self, pkg: PkgId) -> Result<bool> {
        let cache = self.depcache.cache();
        let Some(ver) = self.depcache.inst_version(pkg) else {
            return Ok(false);
        };
        let mut changed = false;

        for group in self.depcache.unsatisfied_groups(pkg, StateView::Inst) {
            if self.depcache.inst_version(pkg) != Some(ver) {
                // The package itself was given up
                break;
            }
            if self.depcache.group_ok(&group, StateView::Inst) {
                continue;
            }
            if cache.dependency(group[0]).dep_type.is_negative() {
                for &dep in &group {
                    for other in self.depcache.installed_matches(dep, StateView::Inst) {
                        if self.depcache.inst_version(pkg) != Some(ver) {
                            break;
                        }
                        changed |= self.fix_conflict(pkg, cache.owner(other), dep)?;
                    }
                }
            } else {
                changed |= self.fix_depends(pkg, &group)?;
            }
        }
        Ok(changed)
    }

    fn fix_conflict(&mut self, pkg: PkgId, other: PkgId, dep: DepId) -> Result<bool> {
        let cache = self.depcache.cache();
        let pkg_protected = self.depcache.is_protected(pkg);
        let other_protected = self.depcache.is_protected(other);
        if pkg_protected && other_protected {
            return Err(Error::UnresolvableConflict(
                cache.name(pkg).to_string(),
                cache.name(other).to_string(),
            ));
        }

        let victim = if other_protected {
            pkg
        } else if pkg_protected || self.score_of(other) <= self.score_of(pkg) {
            other
        } else {
            pkg
        };
        debug!(
            "{} {}: giving up {}",
            cache.name(pkg),
            cache.describe_dep(dep),
            cache.name(victim)
        );
        Ok(self.sacrifice(victim))
    }

    fn fix_depends(&mut self, pkg: PkgId, group: &[DepId]) -> Result<bool> {
        let cache = self.depcache.cache();
        let usable = |resolver: &Self, target: PkgId| {
            target != pkg
                && !resolver.sacrificed.contains(&target)
                && !resolver.depcache.is_protected(target)
        };

        // An installed alternative only needs to be kept
        let installed = group.iter().find_map(|&dep| {
            cache.all_targets(dep).into_iter().find_map(|ver| {
                let target = cache.owner(ver);
                (usable(self, target) && self.depcache.current(target) == Some(ver)).then_some(target)
            })
        });
        if let Some(target) = installed {
            debug!("Keeping {} for {}", cache.name(target), cache.name(pkg));
            self.depcache.mark_keep(target);
            return Ok(true);
        }

        let mut best: Option<PkgId> = None;
        for &dep in group {
            for ver in cache.all_targets(dep) {
                let target = cache.owner(ver);
                if usable(self, target)
                    && self.depcache.candidate(target) == Some(ver)
                    && best.is_none_or(|b| self.score_of(target) > self.score_of(b))
                {
                    best = Some(target);
                }
            }
        }
        if let Some(target) = best {
            if cache.package(target).flags.duplicated {
                self.depcache.warn(format!(
                    "Installing {} to satisfy {}, but it has conflicting definitions",
                    cache.name(target),
                    cache.name(pkg)
                ));
            }
            debug!("Installing {} for {}", cache.name(target), cache.name(pkg));
            self.depcache.mark_install(target, true, 0)?;
            return Ok(true);
        }

        if self.depcache.is_protected(pkg) {
            return Ok(false);
        }
        Ok(self.sacrifice(pkg))
    }

    /// Keep back a planned install, or remove an installed package
    fn sacrifice(&mut self, pkg: PkgId) -> bool {
        let changed = match self.depcache.mode(pkg) {
            Mode::Install => {
                self.depcache.mark_keep(pkg);
                true
            }
            Mode::Keep if self.depcache.current(pkg).is_some() => {
                self.depcache.mark_delete(pkg, false);
                self.depcache.set_auto(pkg, true);
                true
            }
            _ => false,
        };
        if changed {
            debug!("Sacrificed {}", self.depcache.cache().name(pkg));
            self.sacrificed.insert(pkg);
        }
        changed
    }

    /// Packages whose planned change can affect `dep`
    fn related_packages(&self, dep: DepId) -> Vec<PkgId> {
        let cache = self.depcache.cache();
        let d = cache.dependency(dep);
        if d.dep_type.is_negative() {
            return self
                .depcache
                .installed_matches(dep, StateView::Inst)
                .into_iter()
                .map(|v| cache.owner(v))
                .collect();
        }
        let mut out = vec![d.target];
        for ver in cache.providers(d.target) {
            let owner = cache.owner(ver);
            if !out.contains(&owner) {
                out.push(owner);
            }
        }
        out
    }

    /// Remove installed dependencies whose every dependent is being removed
    fn remove_unneeded_depends(&mut self) {
        let cache = self.depcache.cache();
        loop {
            let mut changed = false;
            for pkg in cache.packages() {
                let flags = cache.package(pkg).flags;
                if self.depcache.mode(pkg) != Mode::Keep
                    || self.depcache.current(pkg).is_none()
                    || self.depcache.is_protected(pkg)
                    || flags.essential
                    || flags.important
                {
                    continue;
                }
                let before = score::dependents(&*self.depcache, pkg, StateView::Now);
                if before.is_empty()
                    || !before.iter().all(|&d| self.depcache.mode(d) == Mode::Delete)
                    || !score::dependents(&*self.depcache, pkg, StateView::Inst).is_empty()
                {
                    continue;
                }
                debug!("Removing {}, nothing needs it anymore", cache.name(pkg));
                self.depcache.mark_delete(pkg, false);
                self.depcache.set_auto(pkg, true);
                changed = true;
            }
            if !changed {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::{build, record};
    use crate::cache::{DepType, PackageCache};
    use crate::config::PolicyConfig;
    use crate::index::{RawDependency, RawVersionRecord};
    use crate::policy::Policy;
    use crate::version::CompareOp;

    fn with_dep(mut r: RawVersionRecord, dep_type: DepType, target: &str) -> RawVersionRecord {
        r.depends
            .push(RawDependency::single(dep_type, target, CompareOp::Any, ""));
        r
    }

    fn policy() -> Policy {
        Policy::new(&PolicyConfig::default()).unwrap()
    }

    fn find(cache: &PackageCache, name: &str) -> PkgId {
        cache.find_package(name).unwrap()
    }

    #[test]
    fn test_consistent_cache_resolves_without_changes() {
        let a = with_dep(record("a", "1.0-1"), DepType::Depends, "b");
        let cache = build(vec![a, record("b", "1.0-1")], vec![record("b", "2.0-1")]);
        let policy = policy();
        let mut dep = DepCache::new(&cache, &policy);
        let report = ProblemResolver::new(&mut dep, &ResolverConfig::default())
            .resolve(true)
            .unwrap();
        assert!(report.changes.is_empty());
        assert_eq!(report.iterations, 1);
    }

    #[test]
    fn test_unresolvable_conflict_between_protected() {
        let a = with_dep(record("a", "1.0-1"), DepType::Conflicts, "b");
        let cache = build(vec![record("b", "1.0-1")], vec![a]);
        let policy = policy();
        let mut dep = DepCache::new(&cache, &policy);
        let (a, b) = (find(&cache, "a"), find(&cache, "b"));
        dep.set_protected(b, true);
        dep.mark_install(a, true, 0).unwrap();

        let mut resolver = ProblemResolver::new(&mut dep, &ResolverConfig::default());
        resolver.protect(a);
        match resolver.resolve(false) {
            Err(Error::UnresolvableConflict(x, y)) => {
                assert_eq!(x, "a");
                assert_eq!(y, "b");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_conflict_removes_lower_scored_side() {
        let a = with_dep(record("a", "1.0-1"), DepType::Conflicts, "b");
        let cache = build(vec![record("b", "1.0-1")], vec![a]);
        let policy = policy();
        let mut dep = DepCache::new(&cache, &policy);
        let (a, b) = (find(&cache, "a"), find(&cache, "b"));
        // Without auto install the conflict is left for the resolver
        dep.mark_install(a, false, 0).unwrap();

        let mut resolver = ProblemResolver::new(&mut dep, &ResolverConfig::default());
        resolver.protect(a);
        let report = resolver.resolve(false).unwrap();
        assert_eq!(dep.mode(b), Mode::Delete);
        assert_eq!(dep.mode(a), Mode::Install);
        assert_eq!(report.changes, vec![b]);
    }

    #[test]
    fn test_removal_cascades_to_dependents() {
        let a = with_dep(record("a", "1.0-1"), DepType::Depends, "b");
        let cache = build(vec![a, record("b", "1.0-1")], vec![]);
        let policy = policy();
        let mut dep = DepCache::new(&cache, &policy);
        let (a, b) = (find(&cache, "a"), find(&cache, "b"));
        dep.mark_delete(b, false);

        let mut resolver = ProblemResolver::new(&mut dep, &ResolverConfig::default());
        resolver.protect(b);
        resolver.resolve(false).unwrap();
        assert_eq!(dep.mode(a), Mode::Delete);
        assert_eq!(dep.mode(b), Mode::Delete);
    }

    #[test]
    fn test_installed_alternative_preferred() {
        let mut app = record("app", "1.0-1");
        app.depends.push(RawDependency::or_group(
            DepType::Depends,
            &[("postfix", CompareOp::Any, ""), ("exim", CompareOp::Any, "")],
        ));
        let cache = build(vec![record("exim", "4.97-1")], vec![app, record("postfix", "3.8-1")]);
        let policy = policy();
        let mut dep = DepCache::new(&cache, &policy);
        let app = find(&cache, "app");
        dep.mark_install(app, true, 0).unwrap();
        // Or-groups are left to the resolver, and exim is already satisfying it
        assert_eq!(dep.broken_count(), 0);

        dep.mark_delete(find(&cache, "exim"), false);
        assert!(dep.inst_broken(app));
        let mut resolver = ProblemResolver::new(&mut dep, &ResolverConfig::default());
        resolver.protect(app);
        resolver.resolve(false).unwrap();
        assert_eq!(dep.mode(find(&cache, "exim")), Mode::Keep);
        assert_eq!(dep.mode(find(&cache, "postfix")), Mode::Keep);
    }

    #[test]
    fn test_or_group_installs_highest_scored() {
        let mut app = record("app", "1.0-1");
        app.depends.push(RawDependency::or_group(
            DepType::Depends,
            &[("postfix", CompareOp::Any, ""), ("exim", CompareOp::Any, "")],
        ));
        let cache = build(vec![], vec![app, record("postfix", "3.8-1"), record("exim", "4.97-1")]);
        let policy = policy();
        let mut dep = DepCache::new(&cache, &policy);
        let app = find(&cache, "app");
        dep.mark_install(app, true, 0).unwrap();
        assert!(dep.inst_broken(app));

        let mut resolver = ProblemResolver::new(&mut dep, &ResolverConfig::default());
        resolver.protect(app);
        resolver.resolve(false).unwrap();
        // Equal scores: the first alternative wins
        assert_eq!(dep.mode(find(&cache, "postfix")), Mode::Install);
        assert_eq!(dep.mode(find(&cache, "exim")), Mode::Keep);
    }

    #[test]
    fn test_unsatisfiable_protected_dependency_is_reported() {
        let a = with_dep(record("a", "1.0-1"), DepType::Depends, "missing");
        let cache = build(vec![], vec![a]);
        let policy = policy();
        let mut dep = DepCache::new(&cache, &policy);
        let a = find(&cache, "a");
        dep.mark_install(a, true, 0).unwrap();

        let mut resolver = ProblemResolver::new(&mut dep, &ResolverConfig::default());
        resolver.protect(a);
        match resolver.resolve(false) {
            Err(Error::BrokenAfterResolve { count, problems }) => {
                assert_eq!(count, 1);
                assert_eq!(problems, vec!["a: Depends: missing but it is not installable".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_unprotected_unsatisfiable_install_is_dropped() {
        let a = with_dep(record("a", "1.0-1"), DepType::Depends, "missing");
        let cache = build(vec![], vec![a]);
        let policy = policy();
        let mut dep = DepCache::new(&cache, &policy);
        let a = find(&cache, "a");
        dep.mark_install(a, true, 0).unwrap();

        let report = ProblemResolver::new(&mut dep, &ResolverConfig::default())
            .resolve(false)
            .unwrap();
        assert_eq!(dep.mode(a), Mode::Keep);
        assert!(report.changes.contains(&a));
    }

    #[test]
    fn test_install_protect_keeps_protected_marks() {
        let cache = build(vec![record("a", "1.0-1")], vec![record("a", "2.0-1"), record("n", "1")]);
        let policy = policy();
        let mut dep = DepCache::new(&cache, &policy);
        let (a, n) = (find(&cache, "a"), find(&cache, "n"));
        dep.mark_install(n, false, 0).unwrap();
        dep.mark_delete(a, true);

        let mut resolver = ProblemResolver::new(&mut dep, &ResolverConfig::default());
        resolver.protect(a);
        resolver.protect(n);
        resolver.install_protect().unwrap();
        resolver.resolve(false).unwrap();
        assert_eq!(dep.mode(a), Mode::Delete);
        assert!(dep.state(a).flags.purge);
        assert_eq!(dep.mode(n), Mode::Install);
    }

    #[test]
    fn test_broken_fix_upgrades_broken_package() {
        let a_old = with_dep(record("a", "1.0-1"), DepType::Depends, "gone");
        let cache = build(vec![a_old], vec![record("a", "2.0-1")]);
        let policy = policy();
        let mut dep = DepCache::new(&cache, &policy);
        let a = find(&cache, "a");
        assert!(dep.now_broken(a));

        let report = ProblemResolver::new(&mut dep, &ResolverConfig::default())
            .resolve(true)
            .unwrap();
        assert_eq!(dep.mode(a), Mode::Install);
        assert_eq!(report.changes, vec![a]);
    }

    #[test]
    fn test_resolve_by_keep_holds_back_upgrade() {
        let mut b_new = record("b", "2.0-1");
        b_new
            .depends
            .push(RawDependency::single(DepType::Depends, "libnew", CompareOp::Any, ""));
        let cache = build(vec![record("b", "1.0-1")], vec![b_new]);
        let policy = policy();
        let mut dep = DepCache::new(&cache, &policy);
        let b = find(&cache, "b");
        dep.mark_install(b, false, 0).unwrap();
        assert!(dep.inst_broken(b));

        ProblemResolver::new(&mut dep, &ResolverConfig::default())
            .resolve_by_keep()
            .unwrap();
        assert_eq!(dep.mode(b), Mode::Keep);
        assert_eq!(dep.broken_count(), 0);
    }

    #[test]
    fn test_remove_depends_cascade() {
        let app = with_dep(record("app", "1.0-1"), DepType::Depends, "lib");
        let other = with_dep(record("other", "1.0-1"), DepType::Depends, "shared");
        let lib = with_dep(record("lib", "1.0-1"), DepType::Depends, "shared");
        let cache = build(vec![app, lib, other, record("shared", "1.0-1")], vec![]);
        let policy = policy();
        let mut dep = DepCache::new(&cache, &policy);
        dep.mark_delete(find(&cache, "app"), false);

        let config = ResolverConfig {
            remove_depends: true,
            ..Default::default()
        };
        let mut resolver = ProblemResolver::new(&mut dep, &config);
        resolver.protect(find(&cache, "app"));
        resolver.resolve(false).unwrap();
        assert_eq!(dep.mode(find(&cache, "lib")), Mode::Delete);
        // Still needed by other
        assert_eq!(dep.mode(find(&cache, "shared")), Mode::Keep);
    }

    #[test]
    fn test_installing_duplicated_package_is_reported() {
        use crate::cache::CacheBuilder;
        use crate::config::PackagePatterns;
        use crate::diagnostics::Diagnostics;
        use crate::index::PackageFileMetadata;
        use crate::version::{ArchTable, VersionScheme};

        let first = record("b", "1.0-1");
        let second = with_dep(record("b", "1.0-1"), DepType::Conflicts, "legacy-b");
        let mut builder = CacheBuilder::new(
            VersionScheme::default(),
            ArchTable::default(),
            PackagePatterns::default(),
        );
        let mut diag = Diagnostics::new();
        builder
            .merge(
                PackageFileMetadata::new("repo"),
                vec![with_dep(record("a", "1.0-1"), DepType::Depends, "b"), first],
                &mut diag,
            )
            .unwrap();
        builder
            .merge(PackageFileMetadata::new("mirror"), vec![second], &mut diag)
            .unwrap();
        let cache = builder.finish();
        assert!(cache.package(find(&cache, "b")).flags.duplicated);

        let policy = policy();
        let mut dep = DepCache::new(&cache, &policy);
        dep.mark_install(find(&cache, "a"), false, 0).unwrap();
        ProblemResolver::new(&mut dep, &ResolverConfig::default())
            .resolve(false)
            .unwrap();

        assert_eq!(dep.mode(find(&cache, "b")), Mode::Install);
        let warnings = dep.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("conflicting definitions"));
    }
}
