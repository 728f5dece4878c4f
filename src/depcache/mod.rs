// src/depcache/mod.rs

//! Dependency cache: the planning overlay over the package database
//!
//! Every package gets a [`StateCache`] recording whether it is kept,
//! installed (at which version) or deleted. The broken flags are
//! recomputed for a package and everything depending on it whenever its
//! state changes, so callers can always ask whether the planned system
//! is consistent. The underlying [`PackageCache`] is never modified.

mod state;
mod stats;

pub use state::{Change, Mode, StateCache, StateFlags, StateView};
pub use stats::Stats;

use crate::cache::{DepId, DepType, PackageCache, PkgId, VerId};
use crate::error::{Error, Result};
use crate::policy::Policy;
use std::cmp::Ordering;
use tracing::debug;

const DEFAULT_MAX_INSTALL_DEPTH: usize = 100;

/// Saved planning state, see [`DepCache::snapshot`]
#[derive(Debug, Clone)]
pub struct Snapshot {
    states: Vec<StateCache>,
}

#[derive(Debug)]
pub struct DepCache<'a> {
    cache: &'a PackageCache,
    policy: &'a Policy,
    states: Vec<StateCache>,
    max_install_depth: usize,
    /// Warnings raised while planning, drained by [`DepCache::take_warnings`]
    warnings: Vec<String>,
}

impl<'a> DepCache<'a> {
    /// Build the overlay, selecting a candidate for every package
    pub fn new(cache: &'a PackageCache, policy: &'a Policy) -> Self {
        let states = cache
            .packages()
            .map(|pkg| StateCache {
                candidate: policy.select(cache, pkg),
                ..Default::default()
            })
            .collect();
        let mut depcache = Self {
            cache,
            policy,
            states,
            max_install_depth: DEFAULT_MAX_INSTALL_DEPTH,
            warnings: Vec::new(),
        };
        for pkg in cache.packages() {
            depcache.update_broken(pkg);
        }
        debug!(
            "Dependency cache ready: {} packages, {} broken",
            cache.package_count(),
            depcache.broken_count()
        );
        depcache
    }

    pub fn with_max_install_depth(mut self, depth: usize) -> Self {
        self.max_install_depth = depth;
        self
    }

    /// Queue a warning for the caller's diagnostics
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("Planning warning: {}", message);
        self.warnings.push(message);
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    pub fn cache(&self) -> &'a PackageCache {
        self.cache
    }

    pub fn policy(&self) -> &'a Policy {
        self.policy
    }

    pub fn state(&self, pkg: PkgId) -> &StateCache {
        &self.states[pkg.index()]
    }

    pub fn mode(&self, pkg: PkgId) -> Mode {
        self.states[pkg.index()].mode
    }

    pub fn current(&self, pkg: PkgId) -> Option<VerId> {
        self.cache.package(pkg).current
    }

    pub fn candidate(&self, pkg: PkgId) -> Option<VerId> {
        self.states[pkg.index()].candidate
    }

    /// Version installed once the planned transaction has run
    pub fn inst_version(&self, pkg: PkgId) -> Option<VerId> {
        let state = &self.states[pkg.index()];
        match state.mode {
            Mode::Keep => self.current(pkg),
            Mode::Install => state.install_version,
            Mode::Delete => None,
        }
    }

    pub fn version_in(&self, pkg: PkgId, view: StateView) -> Option<VerId> {
        match view {
            StateView::Now => self.current(pkg),
            StateView::Inst => self.inst_version(pkg),
        }
    }

    pub fn is_protected(&self, pkg: PkgId) -> bool {
        self.states[pkg.index()].protected
    }

    pub fn now_broken(&self, pkg: PkgId) -> bool {
        self.states[pkg.index()].now_broken
    }

    pub fn inst_broken(&self, pkg: PkgId) -> bool {
        self.states[pkg.index()].inst_broken
    }

    /// Newer candidate than the installed version
    pub fn is_upgradable(&self, pkg: PkgId) -> bool {
        match (self.current(pkg), self.candidate(pkg)) {
            (Some(cur), Some(cand)) if cur != cand => {
                self.cache.scheme().compare(
                    &self.cache.version(cand).version,
                    &self.cache.version(cur).version,
                ) == Ordering::Greater
            }
            _ => false,
        }
    }

    /// Mark a package to stay as it is
    pub fn mark_keep(&mut self, pkg: PkgId) {
        let state = &mut self.states[pkg.index()];
        if state.mode == Mode::Keep
            && state.install_version.is_none()
            && !state.flags.purge
            && !state.flags.reinstall
        {
            return;
        }
        state.mode = Mode::Keep;
        state.install_version = None;
        state.flags.purge = false;
        state.flags.reinstall = false;
        self.update_around(pkg);
    }

    /// Mark an installed package for removal.
    ///
    /// A package that is not installed cannot be removed; any pending
    /// install is cancelled instead.
    pub fn mark_delete(&mut self, pkg: PkgId, purge: bool) {
        if self.current(pkg).is_none() {
            if self.mode(pkg) != Mode::Keep {
                self.mark_keep(pkg);
            }
            return;
        }
        let state = &mut self.states[pkg.index()];
        if state.mode == Mode::Delete && state.flags.purge == purge {
            return;
        }
        state.mode = Mode::Delete;
        state.install_version = None;
        state.flags.purge = purge;
        state.flags.reinstall = false;
        self.update_around(pkg);
    }

    /// Mark the candidate version of a package for installation.
    ///
    /// With `auto_inst`, unsatisfied single dependencies of the candidate
    /// are installed recursively and unprotected packages it conflicts
    /// with are marked for removal.
    pub fn mark_install(&mut self, pkg: PkgId, auto_inst: bool, depth: usize) -> Result<()> {
        if depth > self.max_install_depth {
            let cache = self.cache;
            let name = cache.name(pkg);
            self.warn(format!(
                "Not installing {}: dependency depth limit of {} reached",
                name, self.max_install_depth
            ));
            return Ok(());
        }
        let cache = self.cache;
        let Some(cand) = self.candidate(pkg) else {
            return Err(Error::NoCandidateVersion(cache.name(pkg).to_string()));
        };

        let current = self.current(pkg);
        let state = &mut self.states[pkg.index()];
        if current == Some(cand) && !state.flags.reinstall {
            // Already the newest version
            self.mark_keep(pkg);
            return Ok(());
        }
        if state.mode == Mode::Install && state.install_version == Some(cand) {
            return Ok(());
        }
        state.mode = Mode::Install;
        state.install_version = Some(cand);
        state.flags.purge = false;
        self.update_around(pkg);

        if !auto_inst {
            return Ok(());
        }

        for group in cache.dep_groups(cand) {
            match cache.dependency(group[0]).dep_type {
                DepType::Depends | DepType::PreDepends => {
                    if group.len() > 1 || self.group_ok(&group, StateView::Inst) {
                        continue;
                    }
                    let Some(target) = self.installable_satisfier(group[0]) else {
                        debug!(
                            "Nothing installable satisfies {} of {}",
                            cache.describe_dep(group[0]),
                            cache.name(pkg)
                        );
                        continue;
                    };
                    let fresh = self.current(target).is_none() && self.mode(target) != Mode::Install;
                    self.mark_install(target, true, depth + 1)?;
                    if fresh {
                        self.states[target.index()].flags.auto = true;
                    }
                }
                DepType::Conflicts | DepType::Obsoletes => {
                    for &dep in &group {
                        for ver in self.installed_matches(dep, StateView::Inst) {
                            let other = cache.owner(ver);
                            if other == pkg || self.is_protected(other) {
                                continue;
                            }
                            debug!("{} {} removes {}", cache.name(pkg), cache.describe_dep(dep), cache.name(other));
                            self.mark_delete(other, false);
                            self.states[other.index()].flags.auto = true;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// First package whose candidate satisfies `dep`: the target itself,
    /// then providers in declaration order
    pub fn installable_satisfier(&self, dep: DepId) -> Option<PkgId> {
        let cache = self.cache;
        let target = cache.dependency(dep).target;
        let usable = |pkg: PkgId, ver: VerId| {
            !self.is_protected(pkg) && self.candidate(pkg) == Some(ver) && cache.dep_matches(dep, ver)
        };
        if let Some(cand) = self.candidate(target)
            && usable(target, cand)
        {
            return Some(target);
        }
        if cache.dependency(dep).dep_type == DepType::Obsoletes {
            return None;
        }
        cache.package(target).provided_by.iter().find_map(|&prv| {
            let ver = cache.provide(prv).owner;
            let owner = cache.owner(ver);
            usable(owner, ver).then_some(owner)
        })
    }

    pub fn set_reinstall(&mut self, pkg: PkgId, reinstall: bool) {
        self.states[pkg.index()].flags.reinstall = reinstall;
        if !reinstall
            && self.mode(pkg) == Mode::Install
            && self.states[pkg.index()].install_version == self.current(pkg)
        {
            self.mark_keep(pkg);
        }
    }

    /// Override the policy's choice, e.g. for an explicit `name=version`
    pub fn set_candidate(&mut self, pkg: PkgId, ver: VerId) {
        debug_assert_eq!(self.cache.owner(ver), pkg);
        self.states[pkg.index()].candidate = Some(ver);
    }

    pub fn set_protected(&mut self, pkg: PkgId, protected: bool) {
        self.states[pkg.index()].protected = protected;
    }

    pub fn set_auto(&mut self, pkg: PkgId, auto: bool) {
        self.states[pkg.index()].flags.auto = auto;
    }

    pub fn set_user_requested(&mut self, pkg: PkgId, requested: bool) {
        self.states[pkg.index()].user_requested = requested;
    }

    /// Versions matching `dep` that are installed in the given view
    pub fn installed_matches(&self, dep: DepId, view: StateView) -> Vec<VerId> {
        let cache = self.cache;
        let d = cache.dependency(dep);
        let mut out = Vec::new();
        if let Some(ver) = self.version_in(d.target, view)
            && cache.dep_matches(dep, ver)
        {
            out.push(ver);
        }
        if d.dep_type == DepType::Obsoletes {
            return out;
        }
        for &prv in &cache.package(d.target).provided_by {
            let ver = cache.provide(prv).owner;
            if !out.contains(&ver)
                && self.version_in(cache.owner(ver), view) == Some(ver)
                && cache.dep_matches(dep, ver)
            {
                out.push(ver);
            }
        }
        out
    }

    /// Whether an Or-group holds: some alternative is installed for
    /// positive dependencies, nothing matches for negative ones
    pub fn group_ok(&self, group: &[DepId], view: StateView) -> bool {
        let Some(&first) = group.first() else {
            return true;
        };
        let dep_type = self.cache.dependency(first).dep_type;
        if !dep_type.is_critical() {
            return true;
        }
        if dep_type.is_negative() {
            group
                .iter()
                .all(|&dep| self.installed_matches(dep, view).is_empty())
        } else {
            group
                .iter()
                .any(|&dep| !self.installed_matches(dep, view).is_empty())
        }
    }

    /// Critical dependency groups of the package's version in `view` that do not hold
    pub fn unsatisfied_groups(&self, pkg: PkgId, view: StateView) -> Vec<Vec<DepId>> {
        let Some(ver) = self.version_in(pkg, view) else {
            return Vec::new();
        };
        self.cache
            .dep_groups(ver)
            .into_iter()
            .filter(|group| !self.group_ok(group, view))
            .collect()
    }

    fn broken_in(&self, pkg: PkgId, view: StateView) -> bool {
        match self.version_in(pkg, view) {
            Some(ver) => self
                .cache
                .dep_groups(ver)
                .iter()
                .any(|group| !self.group_ok(group, view)),
            None => false,
        }
    }

    fn update_broken(&mut self, pkg: PkgId) {
        let now = self.broken_in(pkg, StateView::Now);
        let inst = self.broken_in(pkg, StateView::Inst);
        let state = &mut self.states[pkg.index()];
        state.now_broken = now;
        state.inst_broken = inst;
    }

    /// Refresh the broken flags of a package and everything that depends on it
    fn update_around(&mut self, pkg: PkgId) {
        self.update_broken(pkg);
        for other in self.cache.affected_by(pkg) {
            if other != pkg {
                self.update_broken(other);
            }
        }
    }

    /// Classify the planned change of a package
    pub fn change(&self, pkg: PkgId) -> Option<Change> {
        let state = &self.states[pkg.index()];
        match state.mode {
            Mode::Keep => None,
            Mode::Delete => Some(Change::Remove),
            Mode::Install => {
                let inst = state.install_version?;
                Some(match self.current(pkg) {
                    None => Change::NewInstall,
                    Some(cur) if cur == inst => Change::Reinstall,
                    Some(cur) => match self.cache.scheme().compare(
                        &self.cache.version(inst).version,
                        &self.cache.version(cur).version,
                    ) {
                        Ordering::Less => Change::Downgrade,
                        _ => Change::Upgrade,
                    },
                })
            }
        }
    }

    /// The package being installed whose Obsoletes removes `pkg`
    pub fn replaced_by(&self, pkg: PkgId) -> Option<PkgId> {
        if self.mode(pkg) != Mode::Delete {
            return None;
        }
        let cur = self.current(pkg)?;
        let cache = self.cache;
        cache.package(pkg).rev_depends.iter().find_map(|&dep| {
            let d = cache.dependency(dep);
            if d.dep_type != DepType::Obsoletes {
                return None;
            }
            let owner = cache.owner(d.owner);
            let installing = self.mode(owner) == Mode::Install
                && self.states[owner.index()].install_version == Some(d.owner);
            (installing && cache.dep_matches(dep, cur)).then_some(owner)
        })
    }

    /// Packages with a pending change, in cache order
    pub fn changed_packages(&self) -> Vec<PkgId> {
        self.cache
            .packages()
            .filter(|&pkg| self.mode(pkg) != Mode::Keep)
            .collect()
    }

    pub fn inst_count(&self) -> usize {
        self.states.iter().filter(|s| s.mode == Mode::Install).count()
    }

    pub fn del_count(&self) -> usize {
        self.states.iter().filter(|s| s.mode == Mode::Delete).count()
    }

    /// Installed packages held back below their candidate
    pub fn keep_count(&self) -> usize {
        self.cache
            .packages()
            .filter(|&pkg| self.mode(pkg) == Mode::Keep && self.is_upgradable(pkg))
            .count()
    }

    pub fn broken_count(&self) -> usize {
        self.states.iter().filter(|s| s.inst_broken).count()
    }

    /// Change in installed size, in bytes
    pub fn usr_size(&self) -> i64 {
        let cache = self.cache;
        let size = |ver: Option<VerId>| ver.map_or(0, |v| cache.version(v).installed_size as i64);
        cache
            .packages()
            .map(|pkg| match self.mode(pkg) {
                Mode::Keep => 0,
                Mode::Install => size(self.inst_version(pkg)) - size(self.current(pkg)),
                Mode::Delete => -size(self.current(pkg)),
            })
            .sum()
    }

    /// Archive bytes needed by the planned installs
    pub fn deb_size(&self) -> u64 {
        self.cache
            .packages()
            .filter(|&pkg| self.mode(pkg) == Mode::Install)
            .filter_map(|pkg| self.inst_version(pkg))
            .map(|ver| self.cache.version(ver).size)
            .sum()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            states: self.states.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        self.states = snapshot.states;
    }
}
