// src/session.rs

//! Planning session
//!
//! A [`Session`] owns the dependency cache overlay and the diagnostics of
//! one run. Requests are given by package name, resolved, ordered and
//! finally handed to a [`PackageManager`].

use crate::cache::{PackageCache, PkgId, VerId};
use crate::config::{Config, PackagePatterns};
use crate::depcache::{DepCache, Mode, Stats};
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::order::{Operation, OrderResult, order_transaction};
use crate::pm::{ApplyOutcome, ArchiveFetcher, Installer, PackageManager};
use crate::policy::Policy;
use crate::resolver::{ProblemResolver, ProviderHook, ResolveReport, describe_problem, select_provider};
use tracing::{debug, info};

pub struct Session<'a> {
    depcache: DepCache<'a>,
    diag: Diagnostics,
    config: &'a Config,
    hook: Option<Box<dyn ProviderHook + 'a>>,
}

impl<'a> Session<'a> {
    /// Start a session. Held packages are kept and protected.
    pub fn new(cache: &'a PackageCache, policy: &'a Policy, config: &'a Config) -> Result<Self> {
        let patterns = PackagePatterns::compile(&config.packages)?;
        let mut depcache =
            DepCache::new(cache, policy).with_max_install_depth(config.resolver.max_install_depth);

        for pkg in cache.packages() {
            if depcache.current(pkg).is_some() && patterns.is_held(cache.base_name(pkg)) {
                debug!("Holding {}", cache.name(pkg));
                depcache.mark_keep(pkg);
                depcache.set_protected(pkg, true);
            }
        }

        Ok(Self {
            depcache,
            diag: Diagnostics::new(),
            config,
            hook: None,
        })
    }

    /// Use `hook` to pick among several providers of a virtual package
    pub fn with_provider_hook(mut self, hook: impl ProviderHook + 'a) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn depcache(&self) -> &DepCache<'a> {
        &self.depcache
    }

    pub fn depcache_mut(&mut self) -> &mut DepCache<'a> {
        &mut self.depcache
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diag
    }

    fn lookup(&self, name: &str) -> Result<PkgId> {
        self.depcache
            .cache()
            .find_package(name)
            .ok_or_else(|| Error::NotFoundError(format!("package {}", name)))
    }

    fn provider_for(&mut self, pkg: PkgId) -> Result<PkgId> {
        match self.hook.as_mut() {
            Some(hook) => {
                let hook: &mut dyn ProviderHook = hook.as_mut();
                select_provider(&self.depcache, pkg, Some(hook))
            }
            None => select_provider(&self.depcache, pkg, None),
        }
    }

    /// Request the installation of `name` or `name=version`
    pub fn mark_install(&mut self, request: &str) -> Result<PkgId> {
        let cache = self.depcache.cache();
        let (name, version) = match request.split_once('=') {
            Some((name, version)) => (name, Some(version)),
            None => (request, None),
        };
        let mut pkg = self.lookup(name)?;
        if cache.is_virtual(pkg) {
            pkg = self.provider_for(pkg)?;
            info!("Note, selecting {} instead of {}", cache.name(pkg), name);
        }

        if let Some(version) = version {
            let ver = self
                .depcache
                .policy()
                .find_version(cache, pkg, version)
                .ok_or_else(|| Error::NotFoundError(format!("version {} of {}", version, name)))?;
            self.depcache.set_candidate(pkg, ver);
        }

        let reinstall = self.config.apply.reinstall;
        if reinstall {
            self.depcache.set_reinstall(pkg, true);
        }
        let current = self.depcache.current(pkg);
        if !reinstall && current.is_some() && self.depcache.candidate(pkg) == current {
            self.diag
                .warning(format!("{} is already the newest version", cache.name(pkg)));
        }

        let marked = self
            .depcache
            .mark_install(pkg, self.config.resolver.auto_install, 0);
        self.collect_warnings();
        marked?;
        self.depcache.set_user_requested(pkg, true);
        self.depcache.set_auto(pkg, false);
        Ok(pkg)
    }

    /// Request the removal of `name`. A virtual name removes its only
    /// installed provider.
    pub fn mark_delete(&mut self, name: &str, purge: bool) -> Result<PkgId> {
        let cache = self.depcache.cache();
        let mut pkg = self.lookup(name)?;
        if cache.is_virtual(pkg) {
            let installed: Vec<PkgId> = cache
                .providers(pkg)
                .into_iter()
                .filter(|&v| self.depcache.current(cache.owner(v)) == Some(v))
                .map(|v| cache.owner(v))
                .collect();
            match installed.as_slice() {
                [] => {}
                [only] => pkg = *only,
                several => {
                    return Err(Error::AmbiguousProvider {
                        name: name.to_string(),
                        providers: several.iter().map(|&p| cache.name(p).to_string()).collect(),
                    });
                }
            }
        }

        if self.depcache.current(pkg).is_none() {
            self.diag
                .warning(format!("Package {} is not installed, so not removed", name));
            return Ok(pkg);
        }
        self.depcache
            .mark_delete(pkg, purge || self.config.apply.purge);
        self.depcache.set_user_requested(pkg, true);
        Ok(pkg)
    }

    pub fn mark_keep(&mut self, name: &str) -> Result<PkgId> {
        let pkg = self.lookup(name)?;
        self.depcache.mark_keep(pkg);
        Ok(pkg)
    }

    /// Keep the current mark of `name` through resolution
    pub fn protect(&mut self, name: &str) -> Result<PkgId> {
        let pkg = self.lookup(name)?;
        self.depcache.set_protected(pkg, true);
        Ok(pkg)
    }

    /// Upgrade every installed package with a newer candidate.
    ///
    /// A plain upgrade never installs or removes anything else and keeps
    /// back what it cannot upgrade; `dist` lets the resolver do both.
    pub fn upgrade(&mut self, dist: bool) -> Result<ResolveReport> {
        let cache = self.depcache.cache();
        let upgradable: Vec<PkgId> = cache
            .packages()
            .filter(|&pkg| {
                self.depcache.is_upgradable(pkg)
                    && self.depcache.mode(pkg) == Mode::Keep
                    && !self.depcache.is_protected(pkg)
            })
            .collect();
        info!("{} packages can be upgraded", upgradable.len());

        for pkg in upgradable {
            let marked = self.depcache.mark_install(pkg, dist, 0);
            if marked.is_err() {
                self.collect_warnings();
            }
            marked?;
        }

        let mut resolver = ProblemResolver::new(&mut self.depcache, &self.config.resolver);
        let result = if dist {
            resolver.resolve(true)
        } else {
            resolver.resolve_by_keep()
        };
        self.collect_warnings();
        result
    }

    /// Repair the planned state.
    ///
    /// With `protect_user_choices` the explicitly requested packages are
    /// protected while resolving. Either way, resolution fails if it had
    /// to change any of them.
    pub fn resolve(&mut self, protect_user_choices: bool) -> Result<ResolveReport> {
        let cache = self.depcache.cache();
        let requested: Vec<(PkgId, Mode, Option<VerId>, bool)> = cache
            .packages()
            .filter(|&pkg| self.depcache.state(pkg).user_requested)
            .map(|pkg| {
                (
                    pkg,
                    self.depcache.mode(pkg),
                    self.depcache.inst_version(pkg),
                    self.depcache.is_protected(pkg),
                )
            })
            .collect();

        if protect_user_choices {
            for &(pkg, ..) in &requested {
                self.depcache.set_protected(pkg, true);
            }
        }
        let result =
            ProblemResolver::new(&mut self.depcache, &self.config.resolver).resolve(true);
        self.collect_warnings();
        if protect_user_choices {
            for &(pkg, _, _, was_protected) in &requested {
                self.depcache.set_protected(pkg, was_protected);
            }
        }
        let report = result?;

        for (pkg, mode, ver, _) in requested {
            if self.depcache.mode(pkg) != mode || self.depcache.inst_version(pkg) != ver {
                return Err(Error::RequestNotHonored(cache.name(pkg).to_string()));
            }
        }
        Ok(report)
    }

    /// Move warnings raised while planning into the diagnostics
    fn collect_warnings(&mut self) {
        for message in self.depcache.take_warnings() {
            self.diag.warning(message);
        }
    }

    /// Run `f` speculatively: on error the marks and the diagnostics it
    /// produced are rolled back
    pub fn attempt<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let snapshot = self.depcache.snapshot();
        self.diag.push_state();
        let result = f(self);
        if result.is_err() {
            self.depcache.restore(snapshot);
            self.diag.discard();
        }
        self.diag.pop_state();
        result
    }

    /// Descriptions of every package broken in the planned state
    pub fn problems(&self) -> Vec<String> {
        let cache = self.depcache.cache();
        cache
            .packages()
            .filter(|&pkg| self.depcache.inst_broken(pkg))
            .map(|pkg| describe_problem(&self.depcache, pkg))
            .collect()
    }

    pub fn ordered_transaction(&self) -> Result<(Vec<Operation>, OrderResult)> {
        let ops = order_transaction(&self.depcache)?;
        Ok((ops, OrderResult::Completed))
    }

    /// Order the plan and run it
    pub fn apply<F: ArchiveFetcher, I: Installer>(
        &mut self,
        manager: &mut PackageManager<F, I>,
    ) -> Result<ApplyOutcome> {
        let (ops, _) = self.ordered_transaction()?;
        let outcome = manager.do_install(&self.depcache, ops)?;
        for label in &outcome.skipped {
            self.diag
                .warning(format!("Couldn't find archive for {}, skipped", label));
        }
        Ok(outcome)
    }

    pub fn inst_count(&self) -> usize {
        self.depcache.inst_count()
    }

    pub fn del_count(&self) -> usize {
        self.depcache.del_count()
    }

    pub fn keep_count(&self) -> usize {
        self.depcache.keep_count()
    }

    pub fn broken_count(&self) -> usize {
        self.depcache.broken_count()
    }

    pub fn stats(&self) -> Stats {
        Stats::collect(&self.depcache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DepType;
    use crate::cache::tests::{build, record};
    use crate::config::PolicyConfig;
    use crate::index::{RawDependency, RawProvide};
    use crate::version::CompareOp;

    fn policy() -> Policy {
        Policy::new(&PolicyConfig::default()).unwrap()
    }

    #[test]
    fn test_unknown_package() {
        let cache = build(vec![], vec![record("a", "1.0-1")]);
        let policy = policy();
        let config = Config::default();
        let mut session = Session::new(&cache, &policy, &config).unwrap();
        assert!(matches!(
            session.mark_install("nosuch"),
            Err(Error::NotFoundError(_))
        ));
    }

    #[test]
    fn test_install_explicit_version() {
        let cache = build(vec![], vec![record("b", "1.0-1"), record("b", "2.0-1")]);
        let policy = policy();
        let config = Config::default();
        let mut session = Session::new(&cache, &policy, &config).unwrap();

        let b = session.mark_install("b=1.0-1").unwrap();
        let ver = session.depcache().inst_version(b).unwrap();
        assert_eq!(cache.version(ver).version, "1.0-1");
        assert!(session.depcache().state(b).user_requested);

        assert!(matches!(
            session.mark_install("b=3.0-1"),
            Err(Error::NotFoundError(_))
        ));
    }

    #[test]
    fn test_virtual_install_uses_hook() {
        let mut postfix = record("postfix", "3.8-1");
        postfix.provides.push(RawProvide::new("mta", None));
        let mut exim = record("exim", "4.97-1");
        exim.provides.push(RawProvide::new("mta", None));
        let cache = build(vec![], vec![postfix, exim]);
        let policy = policy();
        let config = Config::default();

        let mut session = Session::new(&cache, &policy, &config).unwrap();
        assert!(matches!(
            session.mark_install("mta"),
            Err(Error::AmbiguousProvider { .. })
        ));

        let mut session = Session::new(&cache, &policy, &config)
            .unwrap()
            .with_provider_hook(|cache: &PackageCache, _name: &str, providers: &[VerId]| {
                providers
                    .iter()
                    .copied()
                    .find(|&v| cache.name(cache.owner(v)) == "postfix")
            });
        let pkg = session.mark_install("mta").unwrap();
        assert_eq!(cache.name(pkg), "postfix");
    }

    #[test]
    fn test_remove_not_installed_warns() {
        let cache = build(vec![], vec![record("a", "1.0-1")]);
        let policy = policy();
        let config = Config::default();
        let mut session = Session::new(&cache, &policy, &config).unwrap();

        session.mark_delete("a", false).unwrap();
        assert_eq!(session.del_count(), 0);
        assert_eq!(session.diagnostics().len(), 1);
    }

    #[test]
    fn test_remove_through_virtual_name() {
        let mut postfix = record("postfix", "3.8-1");
        postfix.provides.push(RawProvide::new("mta", None));
        let cache = build(vec![postfix], vec![]);
        let policy = policy();
        let config = Config::default();
        let mut session = Session::new(&cache, &policy, &config).unwrap();

        let pkg = session.mark_delete("mta", true).unwrap();
        assert_eq!(cache.name(pkg), "postfix");
        assert_eq!(session.depcache().mode(pkg), Mode::Delete);
        assert!(session.depcache().state(pkg).flags.purge);
    }

    #[test]
    fn test_held_packages_stay() {
        let cache = build(
            vec![record("kernel", "6.8-1"), record("bash", "5.1-1")],
            vec![record("kernel", "6.9-1"), record("bash", "5.2-1")],
        );
        let policy = policy();
        let mut config = Config::default();
        config.packages.hold = vec!["^kernel$".to_string()];
        let mut session = Session::new(&cache, &policy, &config).unwrap();

        session.upgrade(false).unwrap();
        let kernel = cache.find_package("kernel").unwrap();
        let bash = cache.find_package("bash").unwrap();
        assert_eq!(session.depcache().mode(kernel), Mode::Keep);
        assert_eq!(session.depcache().mode(bash), Mode::Install);
        assert_eq!(session.keep_count(), 1);
    }

    #[test]
    fn test_safe_upgrade_keeps_back() {
        let mut bash = record("bash", "5.2-1");
        bash.depends
            .push(RawDependency::single(DepType::Depends, "readline", CompareOp::GreaterEq, "8.2"));
        let cache = build(
            vec![record("bash", "5.1-1"), record("readline", "8.1-1")],
            vec![bash],
        );
        let policy = policy();
        let config = Config::default();
        let mut session = Session::new(&cache, &policy, &config).unwrap();

        session.upgrade(false).unwrap();
        assert_eq!(session.inst_count(), 0);
        assert_eq!(session.broken_count(), 0);
        assert_eq!(session.stats().not_upgraded, 1);
    }

    #[test]
    fn test_request_not_honored() {
        let mut a = record("a", "1.0-1");
        a.depends
            .push(RawDependency::single(DepType::Conflicts, "b", CompareOp::Any, ""));
        let cache = build(vec![record("b", "1.0-1")], vec![a]);
        let policy = policy();
        let config = Config::default();
        let mut session = Session::new(&cache, &policy, &config).unwrap();

        session.protect("b").unwrap();
        session.mark_install("a").unwrap();
        match session.resolve(false) {
            Err(Error::RequestNotHonored(name)) => assert_eq!(name, "a"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_attempt_rolls_back() {
        let cache = build(vec![record("a", "1.0-1")], vec![record("b", "1.0-1")]);
        let policy = policy();
        let config = Config::default();
        let mut session = Session::new(&cache, &policy, &config).unwrap();

        let result: Result<()> = session.attempt(|s| {
            s.mark_install("b")?;
            s.diagnostics_mut().warning("speculative");
            s.mark_install("nosuch")?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(session.inst_count(), 0);
        assert!(session.diagnostics().is_empty());

        session.attempt(|s| s.mark_delete("a", false)).unwrap();
        assert_eq!(session.del_count(), 1);
    }
}
