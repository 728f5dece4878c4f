// src/resolver/score.rs

//! Package scores
//!
//! A higher score makes a package more resistant to being sacrificed when
//! the resolver has to give something up.

use crate::cache::{DepType, PkgId};
use crate::depcache::{DepCache, Mode, StateView};

pub const ESSENTIAL_BONUS: i64 = 10_000;
pub const IMPORTANT_BONUS: i64 = 5_000;

pub fn score(depcache: &DepCache<'_>, pkg: PkgId) -> i64 {
    let cache = depcache.cache();
    let state = depcache.state(pkg);
    let flags = cache.package(pkg).flags;
    let mut score = 0;

    if depcache.current(pkg).is_some() {
        score += 1;
    }
    if let Some(cand) = state.candidate {
        score += i64::from(depcache.policy().priority(cache, cand));
    }
    if state.protected {
        score += 1;
    }
    if state.user_requested && state.mode == Mode::Delete {
        score -= 1;
    }
    if flags.essential {
        score += ESSENTIAL_BONUS;
    }
    if flags.important {
        score += IMPORTANT_BONUS;
    }
    score + dependents(depcache, pkg, StateView::Now).len() as i64
}

pub fn compute(depcache: &DepCache<'_>) -> Vec<i64> {
    depcache
        .cache()
        .packages()
        .map(|pkg| score(depcache, pkg))
        .collect()
}

/// Packages whose version in `view` has a Depends or PreDepends matched by
/// the installed version of `pkg`, directly or through a provide
pub fn dependents(depcache: &DepCache<'_>, pkg: PkgId, view: StateView) -> Vec<PkgId> {
    let cache = depcache.cache();
    let Some(cur) = depcache.current(pkg) else {
        return Vec::new();
    };
    let mut names = vec![pkg];
    for &prv in &cache.version(cur).provides {
        let name = cache.provide(prv).name;
        if !names.contains(&name) {
            names.push(name);
        }
    }

    let mut out = Vec::new();
    for name in names {
        for &dep in &cache.package(name).rev_depends {
            let d = cache.dependency(dep);
            if !matches!(d.dep_type, DepType::Depends | DepType::PreDepends) {
                continue;
            }
            let owner = cache.owner(d.owner);
            if owner != pkg
                && !out.contains(&owner)
                && depcache.version_in(owner, view) == Some(d.owner)
                && cache.dep_matches(dep, cur)
            {
                out.push(owner);
            }
        }
    }
    out
}
