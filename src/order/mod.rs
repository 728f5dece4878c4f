// src/order/mod.rs

//! Transaction ordering
//!
//! Turns the marked packages of a resolved [`DepCache`] into a linear list
//! of install, configure and remove operations:
//!
//! - Install(X) always precedes Configure(X);
//! - a PreDepends target is installed and configured before the dependent
//!   is installed;
//! - a package removed because of a Conflicts or Obsoletes is removed before
//!   the package causing it is installed.
//!
//! Ordinary Depends only steer the order: dependencies are configured
//! before their dependents, and dependents are removed before the packages
//! they depend on.

mod graph;

pub use graph::OpGraph;

use crate::cache::{DepType, PackageCache, PkgId, VerId};
use crate::depcache::{DepCache, Mode, StateView};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use strum_macros::Display;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum OpKind {
    Install,
    Configure,
    Remove,
    Purge,
}

impl OpKind {
    pub fn is_removal(self) -> bool {
        matches!(self, Self::Remove | Self::Purge)
    }
}

/// One step of an ordered transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub kind: OpKind,
    pub package: PkgId,
    /// Version installed, or the installed version being removed
    pub version: VerId,
    /// Local archive, filled in once fetched
    pub file: Option<PathBuf>,
}

impl Operation {
    pub fn new(kind: OpKind, package: PkgId, version: VerId) -> Self {
        Self {
            kind,
            package,
            version,
            file: None,
        }
    }

    /// `Install foo-1.0-1.x86_64`
    pub fn describe(&self, cache: &PackageCache) -> String {
        format!("{} {}", self.kind, cache.version_label(self.version))
    }
}

/// Outcome of running an ordered transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum OrderResult {
    Completed,
    Failed,
    /// Some packages were left out because their archives were missing
    Incomplete,
}

/// Node indices of one package's operations
#[derive(Debug, Default, Clone, Copy)]
struct PackageNodes {
    install: Option<usize>,
    configure: Option<usize>,
    remove: Option<usize>,
}

/// Order the planned changes of `depcache`
pub fn order_transaction(depcache: &DepCache<'_>) -> Result<Vec<Operation>> {
    let cache = depcache.cache();
    let mut ops = Vec::new();
    let mut nodes: BTreeMap<PkgId, PackageNodes> = BTreeMap::new();

    // Removals first so that they win ties
    for pkg in depcache.changed_packages() {
        if depcache.mode(pkg) != Mode::Delete {
            continue;
        }
        let Some(cur) = depcache.current(pkg) else {
            continue;
        };
        let kind = if depcache.state(pkg).flags.purge {
            OpKind::Purge
        } else {
            OpKind::Remove
        };
        nodes.entry(pkg).or_default().remove = Some(ops.len());
        ops.push(Operation::new(kind, pkg, cur));
    }
    for pkg in depcache.changed_packages() {
        if depcache.mode(pkg) != Mode::Install {
            continue;
        }
        let Some(ver) = depcache.inst_version(pkg) else {
            continue;
        };
        let entry = nodes.entry(pkg).or_default();
        entry.install = Some(ops.len());
        ops.push(Operation::new(OpKind::Install, pkg, ver));
        entry.configure = Some(ops.len());
        ops.push(Operation::new(OpKind::Configure, pkg, ver));
    }

    let mut graph = OpGraph::new(ops.len());
    for (&pkg, n) in &nodes {
        if let (Some(install), Some(configure)) = (n.install, n.configure) {
            graph.add_hard_edge(install, configure);
            add_install_edges(depcache, &nodes, &mut graph, pkg, install, configure);
        }
        if let Some(remove) = n.remove {
            add_remove_edges(depcache, &nodes, &mut graph, pkg, remove);
        }
    }

    match graph.topological_sort() {
        Ok(order) => {
            debug!("Ordered {} operations", order.len());
            Ok(order.into_iter().map(|i| ops[i].clone()).collect())
        }
        Err(remaining) => {
            let cycle = graph.detect_cycle(&remaining).unwrap_or_else(|| remaining.clone());
            let mut packages: Vec<String> = Vec::new();
            for node in cycle {
                let name = cache.name(ops[node].package).to_string();
                if packages.last() != Some(&name) {
                    packages.push(name);
                }
            }
            Err(Error::OrderingCycle {
                packages,
                remaining: remaining.len(),
            })
        }
    }
}

fn add_install_edges(
    depcache: &DepCache<'_>,
    nodes: &BTreeMap<PkgId, PackageNodes>,
    graph: &mut OpGraph,
    pkg: PkgId,
    install: usize,
    configure: usize,
) {
    let cache = depcache.cache();
    let Some(ver) = depcache.inst_version(pkg) else {
        return;
    };

    for &dep in &cache.version(ver).depends {
        let d = cache.dependency(dep);
        match d.dep_type {
            DepType::PreDepends | DepType::Depends => {
                for target_ver in depcache.installed_matches(dep, StateView::Inst) {
                    let target = cache.owner(target_ver);
                    if target == pkg {
                        continue;
                    }
                    let Some(t) = nodes.get(&target) else {
                        continue;
                    };
                    let (Some(t_install), Some(t_configure)) = (t.install, t.configure) else {
                        continue;
                    };
                    if d.dep_type == DepType::PreDepends {
                        graph.add_hard_edge(t_configure, install);
                    } else {
                        graph.add_soft_edge(t_install, install);
                        graph.add_soft_edge(t_configure, configure);
                    }
                }
            }
            DepType::Conflicts | DepType::Obsoletes => {
                for (&other, n) in nodes {
                    let Some(remove) = n.remove else {
                        continue;
                    };
                    let Some(cur) = depcache.current(other) else {
                        continue;
                    };
                    if other != pkg && cache.dep_matches(dep, cur) {
                        graph.add_hard_edge(remove, install);
                    }
                }
            }
            _ => {}
        }
    }
}

fn add_remove_edges(
    depcache: &DepCache<'_>,
    nodes: &BTreeMap<PkgId, PackageNodes>,
    graph: &mut OpGraph,
    pkg: PkgId,
    remove: usize,
) {
    let cache = depcache.cache();
    let Some(cur) = depcache.current(pkg) else {
        return;
    };
    for &dep in &cache.version(cur).depends {
        let d = cache.dependency(dep);
        // The removed package may be the one declaring the conflict
        if matches!(d.dep_type, DepType::Conflicts | DepType::Obsoletes) {
            for (&other, n) in nodes {
                let Some(install) = n.install else {
                    continue;
                };
                let Some(ver) = depcache.inst_version(other) else {
                    continue;
                };
                if other != pkg && cache.dep_matches(dep, ver) {
                    graph.add_hard_edge(remove, install);
                }
            }
            continue;
        }
        if !matches!(d.dep_type, DepType::Depends | DepType::PreDepends) {
            continue;
        }
        // Dependents go before the packages they need
        for target_ver in depcache.installed_matches(dep, StateView::Now) {
            let target = cache.owner(target_ver);
            if target == pkg {
                continue;
            }
            if let Some(t_remove) = nodes.get(&target).and_then(|n| n.remove) {
                graph.add_soft_edge(remove, t_remove);
            }
        }
    }
}
