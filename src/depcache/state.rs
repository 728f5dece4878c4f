// src/depcache/state.rs

//! Per-package planning state

use crate::cache::VerId;
use serde::Serialize;
use strum_macros::Display;

/// What a package is marked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Keep,
    /// Install the install version (also covers upgrades, downgrades and reinstalls)
    Install,
    Delete,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateFlags {
    /// Remove configuration along with the package
    pub purge: bool,
    pub reinstall: bool,
    /// Marked by the resolver or an automatic install, not by the user
    pub auto: bool,
}

/// Mutable overlay of one package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateCache {
    pub mode: Mode,
    pub install_version: Option<VerId>,
    pub candidate: Option<VerId>,
    pub protected: bool,
    pub now_broken: bool,
    pub inst_broken: bool,
    pub flags: StateFlags,
    pub user_requested: bool,
}

/// How a marked package changes the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Change {
    NewInstall,
    Upgrade,
    Downgrade,
    Reinstall,
    Remove,
}

/// Which version of a package to look at when checking dependencies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateView {
    /// The currently installed system
    Now,
    /// The system after the planned transaction
    Inst,
}
