// src/resolver/problem.rs

//! Human-readable descriptions of broken packages

use crate::cache::{DepId, PkgId};
use crate::depcache::{DepCache, Mode, StateView};

/// Describe why `pkg` is broken in the planned state, one clause per
/// unsatisfied dependency group.
///
/// `foo: Depends: bar (>= 2.0) but 1.0-1 is to be installed`
pub fn describe(depcache: &DepCache<'_>, pkg: PkgId) -> String {
    let cache = depcache.cache();
    let clauses: Vec<String> = depcache
        .unsatisfied_groups(pkg, StateView::Inst)
        .iter()
        .map(|group| {
            group
                .iter()
                .map(|&dep| format!("{} {}", cache.describe_dep(dep), reason(depcache, dep)))
                .collect::<Vec<_>>()
                .join(" or ")
        })
        .collect();
    format!("{}: {}", cache.name(pkg), clauses.join("; "))
}

fn reason(depcache: &DepCache<'_>, dep: DepId) -> String {
    let cache = depcache.cache();
    let d = cache.dependency(dep);

    if d.dep_type.is_negative() {
        let installed: Vec<String> = depcache
            .installed_matches(dep, StateView::Inst)
            .into_iter()
            .map(|v| cache.version_label(v))
            .collect();
        return format!("but {} is to be installed", installed.join(", "));
    }

    if let Some(ver) = depcache.inst_version(d.target) {
        return format!("but {} is to be installed", cache.version(ver).version);
    }
    if cache.is_virtual(d.target) {
        return "but it is a virtual package".to_string();
    }
    if depcache.mode(d.target) == Mode::Delete || depcache.candidate(d.target).is_some() {
        return "but it is not going to be installed".to_string();
    }
    "but it is not installable".to_string()
}
