// src/pm/rpm.rs

//! Applying an ordered transaction with the `rpm` command
//!
//! Consecutive operations of the same kind are grouped into one rpm run:
//! `-e` for removals, `-U` for installs and upgrades, and `-i` for
//! multi-version packages that must be installed next to an existing
//! version. Configure steps have no rpm counterpart.

use super::Installer;
use super::scripts::HookRunner;
use crate::cache::{PackageCache, PkgId, VerId};
use crate::config::RpmConfig;
use crate::error::{Error, Result};
use crate::order::{OpKind, Operation};
use std::io::Write;
use std::process::Command;
use strum_macros::Display;
use tempfile::NamedTempFile;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RunKind {
    Erase,
    Install,
    Upgrade,
}

/// One rpm command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub kind: RunKind,
    pub args: Vec<String>,
    /// Archive paths, or package names for erase runs
    pub targets: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RpmInstaller {
    config: RpmConfig,
    hooks: HookRunner,
}

impl RpmInstaller {
    pub fn new(config: &RpmConfig) -> Self {
        Self {
            config: config.clone(),
            hooks: HookRunner::new(config),
        }
    }

    /// Group operations into rpm runs, in order
    pub fn plan_invocations(&self, cache: &PackageCache, ops: &[Operation]) -> Result<Vec<Invocation>> {
        let mut runs: Vec<(RunKind, Vec<String>)> = Vec::new();

        for op in ops {
            let (kind, target) = match op.kind {
                OpKind::Configure => continue,
                OpKind::Remove | OpKind::Purge => (RunKind::Erase, erase_name(cache, op.version)),
                OpKind::Install => {
                    let file = op
                        .file
                        .as_ref()
                        .ok_or_else(|| Error::ArchiveMissing(cache.version_label(op.version)))?;
                    let kind = if installs_beside(cache, op.package) {
                        RunKind::Install
                    } else {
                        RunKind::Upgrade
                    };
                    (kind, file.to_string_lossy().into_owned())
                }
            };
            match runs.last_mut() {
                Some((last, targets)) if *last == kind => targets.push(target),
                _ => runs.push((kind, vec![target])),
            }
        }

        let batch = if self.config.max_batch_size == 0 {
            usize::MAX
        } else {
            self.config.max_batch_size
        };
        let mut out = Vec::new();
        for (kind, targets) in runs {
            for chunk in targets.chunks(batch) {
                out.push(Invocation {
                    kind,
                    args: self.base_args(kind),
                    targets: chunk.to_vec(),
                });
            }
        }
        Ok(out)
    }

    fn base_args(&self, kind: RunKind) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        match kind {
            RunKind::Erase => args.push("-e".to_string()),
            RunKind::Install => args.push("-i".to_string()),
            RunKind::Upgrade => args.push("-U".to_string()),
        }
        if kind != RunKind::Erase {
            if self.config.interactive {
                args.push("-vh".to_string());
            } else {
                args.push("-v".to_string());
                args.push("--percent".to_string());
            }
        }
        if let Some(ref root) = self.config.root_dir {
            args.push("-r".to_string());
            args.push(root.clone());
        }
        args.extend(self.config.options.iter().cloned());
        if kind == RunKind::Erase {
            args.extend(self.config.erase_options.iter().cloned());
        } else {
            args.extend(self.config.install_options.iter().cloned());
        }
        args.push("--nodeps".to_string());
        if kind != RunKind::Erase && !self.config.order {
            args.push("--noorder".to_string());
        }
        args
    }

    fn run(&self, invocation: &Invocation) -> Result<()> {
        let mut argv = invocation.args.clone();
        // Kept alive until rpm has read it
        let mut _list_file = None;
        if invocation.kind != RunKind::Erase && invocation.targets.len() > self.config.file_list_threshold {
            let mut file = NamedTempFile::new()?;
            for target in &invocation.targets {
                writeln!(file, "{}", target)?;
            }
            file.flush()?;
            debug!(
                "Passing {} packages through {}",
                invocation.targets.len(),
                file.path().display()
            );
            argv.push(file.path().to_string_lossy().into_owned());
            _list_file = Some(file);
        } else {
            argv.extend(invocation.targets.iter().cloned());
        }

        if self.config.debug_dry_run {
            info!("Would run: {} {}", self.config.binary, argv.join(" "));
            return Ok(());
        }

        info!("Running {} {}", self.config.binary, argv.join(" "));
        let status = Command::new(&self.config.binary).args(&argv).status()?;
        if !status.success() {
            return Err(Error::InstallerFailed {
                program: self.config.binary.clone(),
                code: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}

impl Installer for RpmInstaller {
    fn apply(&mut self, cache: &PackageCache, ops: &[Operation]) -> Result<()> {
        let invocations = self.plan_invocations(cache, ops)?;
        let dry_run = self.config.debug_dry_run;

        if !dry_run {
            self.hooks.run_all("pre-invoke", &self.config.pre_invoke, None)?;
            if !self.config.pre_install_pkgs.is_empty() {
                let archives: String = ops
                    .iter()
                    .filter(|op| op.kind == OpKind::Install)
                    .filter_map(|op| op.file.as_ref())
                    .map(|path| format!("{}\n", path.display()))
                    .collect();
                self.hooks
                    .run_all("pre-install-pkgs", &self.config.pre_install_pkgs, Some(&archives))?;
            }
        }

        for invocation in &invocations {
            self.run(invocation)?;
        }

        if !dry_run {
            self.hooks.run_all("post-invoke", &self.config.post_invoke, None)?;
        }
        Ok(())
    }
}

/// Name passed to `rpm -e`. Multi-version packages need the exact
/// `name-version-release`.
fn erase_name(cache: &PackageCache, ver: VerId) -> String {
    let v = cache.version(ver);
    let name = cache.name(v.package);
    if !name.contains('#') {
        return name.to_string();
    }
    let version = v.version.split_once(':').map_or(v.version.as_str(), |(_, rest)| rest);
    format!("{}-{}", cache.base_name(v.package), version)
}

/// A multi-version package with another version of it installed
fn installs_beside(cache: &PackageCache, pkg: PkgId) -> bool {
    if !cache.name(pkg).contains('#') {
        return false;
    }
    let base = cache.base_name(pkg);
    cache
        .packages()
        .any(|other| other != pkg && cache.package(other).current.is_some() && cache.base_name(other) == base)
}
