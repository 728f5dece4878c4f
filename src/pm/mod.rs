// src/pm/mod.rs

//! Package manager driver
//!
//! Checks a resolved plan, locates the archives of the packages to install
//! and hands the ordered operations to an [`Installer`].

mod fetch;
mod rpm;
mod scripts;

pub use fetch::{ArchiveFetcher, LocalArchives};
pub use rpm::{Invocation, RpmInstaller, RunKind};
pub use scripts::HookRunner;

use crate::cache::{PackageCache, PkgId};
use crate::config::ApplyConfig;
use crate::depcache::{DepCache, Stats};
use crate::error::{Error, Result};
use crate::order::{OpKind, Operation, OrderResult};
use crate::resolver::describe_problem;
use std::collections::HashSet;
use tracing::{info, warn};

/// Executes an ordered list of operations against the system
pub trait Installer {
    fn apply(&mut self, cache: &PackageCache, ops: &[Operation]) -> Result<()>;
}

/// Result of [`PackageManager::do_install`]
#[derive(Debug)]
pub struct ApplyOutcome {
    pub result: OrderResult,
    /// Installer error behind a `Failed` result
    pub error: Option<Error>,
    /// Packages left out because their archives were missing
    pub skipped: Vec<String>,
}

pub struct PackageManager<F: ArchiveFetcher, I: Installer> {
    fetcher: F,
    installer: I,
    config: ApplyConfig,
}

impl<F: ArchiveFetcher, I: Installer> PackageManager<F, I> {
    pub fn new(fetcher: F, installer: I, config: &ApplyConfig) -> Self {
        Self {
            fetcher,
            installer,
            config: config.clone(),
        }
    }

    pub fn installer(&self) -> &I {
        &self.installer
    }

    /// Refuse plans that are broken or that remove what the configuration
    /// protects
    pub fn check(&self, depcache: &DepCache<'_>) -> Result<()> {
        let broken = depcache.broken_count();
        if broken > 0 {
            let cache = depcache.cache();
            let problems = cache
                .packages()
                .filter(|&pkg| depcache.inst_broken(pkg))
                .map(|pkg| describe_problem(depcache, pkg))
                .collect();
            return Err(Error::BrokenAfterResolve {
                count: broken,
                problems,
            });
        }
        if !self.config.allow_remove && depcache.del_count() > 0 {
            return Err(Error::RemoveDisabled);
        }
        if !self.config.allow_essential_removal {
            let stats = Stats::collect(depcache);
            if !stats.essential_removals.is_empty() {
                return Err(Error::EssentialRemoval(stats.essential_removals));
            }
        }
        Ok(())
    }

    /// Attach archive paths to the install operations.
    ///
    /// With `fix_missing` the operations of packages whose archive cannot
    /// be found are dropped and their names returned; otherwise the first
    /// missing archive is an error.
    pub fn fetch_archives(&mut self, cache: &PackageCache, ops: &mut Vec<Operation>) -> Result<Vec<String>> {
        let mut missing: HashSet<PkgId> = HashSet::new();
        let mut skipped = Vec::new();

        for op in ops.iter_mut().filter(|op| op.kind == OpKind::Install) {
            match self.fetcher.fetch(cache, op.version) {
                Ok(path) => op.file = Some(path),
                Err(Error::ArchiveMissing(label)) if self.config.fix_missing => {
                    warn!("Skipping {}: archive not found", label);
                    missing.insert(op.package);
                    skipped.push(label);
                }
                Err(e) => return Err(e),
            }
        }

        ops.retain(|op| op.kind.is_removal() || !missing.contains(&op.package));
        Ok(skipped)
    }

    /// Check, fetch and run an ordered transaction
    pub fn do_install(&mut self, depcache: &DepCache<'_>, mut ops: Vec<Operation>) -> Result<ApplyOutcome> {
        self.check(depcache)?;
        let cache = depcache.cache();
        let skipped = self.fetch_archives(cache, &mut ops)?;

        if self.config.purge {
            for op in ops.iter_mut().filter(|op| op.kind == OpKind::Remove) {
                op.kind = OpKind::Purge;
            }
        }

        info!("Applying {} operations", ops.len());
        if let Err(e) = self.installer.apply(cache, &ops) {
            warn!("Transaction failed: {}", e);
            return Ok(ApplyOutcome {
                result: OrderResult::Failed,
                error: Some(e),
                skipped,
            });
        }

        let result = if skipped.is_empty() {
            OrderResult::Completed
        } else {
            OrderResult::Incomplete
        };
        Ok(ApplyOutcome {
            result,
            error: None,
            skipped,
        })
    }
}
