// src/cli.rs
//! CLI definitions for rapt
//!
//! The command implementations live in `main.rs`.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use rapt::config::DEFAULT_CONFIG_PATH;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rapt")]
#[command(author = "rapt Contributors")]
#[command(version)]
#[command(about = "APT-style dependency resolution for RPM systems", long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by the commands that change the system
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct ChangeOptions {
    /// Show the planned operations without running rpm
    #[arg(short, long)]
    pub simulate: bool,

    /// Remove configuration files along with packages
    #[arg(long)]
    pub purge: bool,

    /// Skip packages whose archives are missing
    #[arg(long)]
    pub fix_missing: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install packages (`name` or `name=version`)
    Install {
        #[arg(required = true)]
        packages: Vec<String>,

        /// Reinstall packages that are already at the candidate version
        #[arg(long)]
        reinstall: bool,

        #[command(flatten)]
        options: ChangeOptions,
    },

    /// Remove installed packages
    Remove {
        #[arg(required = true)]
        packages: Vec<String>,

        #[command(flatten)]
        options: ChangeOptions,
    },

    /// Upgrade installed packages
    Upgrade {
        /// Allow installing and removing packages to complete the upgrade
        #[arg(long)]
        dist: bool,

        #[command(flatten)]
        options: ChangeOptions,
    },

    /// Report packages with unsatisfied dependencies
    Check,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
