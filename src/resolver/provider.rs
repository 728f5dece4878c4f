// src/resolver/provider.rs

//! Choosing a provider for a virtual package

use crate::cache::{PackageCache, PkgId, VerId};
use crate::depcache::DepCache;
use crate::error::{Error, Result};
use tracing::debug;

/// Picks among several good providers of a virtual package
pub trait ProviderHook {
    /// Return one of `providers`, or `None` to leave the choice ambiguous
    fn choose(&mut self, cache: &PackageCache, name: &str, providers: &[VerId]) -> Option<VerId>;
}

impl<F> ProviderHook for F
where
    F: FnMut(&PackageCache, &str, &[VerId]) -> Option<VerId>,
{
    fn choose(&mut self, cache: &PackageCache, name: &str, providers: &[VerId]) -> Option<VerId> {
        self(cache, name, providers)
    }
}

/// Providers of `pkg` that are installed, or whose candidate version is
/// the providing version. One entry per providing package.
pub fn good_providers(depcache: &DepCache<'_>, pkg: PkgId) -> Vec<VerId> {
    let cache = depcache.cache();
    let mut out: Vec<VerId> = Vec::new();
    for &prv in &cache.package(pkg).provided_by {
        let ver = cache.provide(prv).owner;
        let owner = cache.owner(ver);
        let good = depcache.current(owner) == Some(ver) || depcache.candidate(owner) == Some(ver);
        if good && !out.iter().any(|&v| cache.owner(v) == owner) {
            out.push(ver);
        }
    }
    out
}

/// Resolve a virtual package name to the package to install
pub fn select_provider(
    depcache: &DepCache<'_>,
    pkg: PkgId,
    hook: Option<&mut dyn ProviderHook>,
) -> Result<PkgId> {
    let cache = depcache.cache();
    let name = cache.name(pkg);
    let providers = good_providers(depcache, pkg);

    match providers.as_slice() {
        [] => Err(Error::NoProvider(name.to_string())),
        [only] => {
            debug!("Selecting {} for virtual package {}", cache.version_label(*only), name);
            Ok(cache.owner(*only))
        }
        several => {
            if let Some(hook) = hook
                && let Some(choice) = hook.choose(cache, name, several)
                && several.contains(&choice)
            {
                debug!("Hook selected {} for {}", cache.version_label(choice), name);
                return Ok(cache.owner(choice));
            }
            Err(Error::AmbiguousProvider {
                name: name.to_string(),
                providers: several
                    .iter()
                    .map(|&v| cache.name(cache.owner(v)).to_string())
                    .collect(),
            })
        }
    }
}
