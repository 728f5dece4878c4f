// src/main.rs

mod cli;

use anyhow::{Result, bail};
use clap::{CommandFactory, Parser};
use cli::{ChangeOptions, Cli, Commands};
use rapt::cache::build_cache;
use rapt::config::Config;
use rapt::diagnostics::Diagnostics;
use rapt::index::IndexRegistry;
use rapt::order::OrderResult;
use rapt::pm::{LocalArchives, PackageManager, RpmInstaller};
use rapt::policy::Policy;
use rapt::session::Session;
use std::path::Path;
use tracing::info;

/// What a system-changing command asks for
enum Request {
    Install(Vec<String>),
    Remove(Vec<String>),
    Upgrade { dist: bool },
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Install {
            packages,
            reinstall,
            options,
        } => {
            let mut config = load_config(&cli.config, options)?;
            config.apply.reinstall |= reinstall;
            run(&config, Request::Install(packages), options.simulate)
        }
        Commands::Remove { packages, options } => {
            let config = load_config(&cli.config, options)?;
            run(&config, Request::Remove(packages), options.simulate)
        }
        Commands::Upgrade { dist, options } => {
            let config = load_config(&cli.config, options)?;
            run(&config, Request::Upgrade { dist }, options.simulate)
        }
        Commands::Check => {
            let config = Config::load_or_default(&cli.config)?;
            check(&config)
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "rapt", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn load_config(path: &Path, options: ChangeOptions) -> Result<Config> {
    let mut config = Config::load_or_default(path)?;
    config.apply.purge |= options.purge;
    config.apply.fix_missing |= options.fix_missing;
    Ok(config)
}

fn run(config: &Config, request: Request, simulate: bool) -> Result<()> {
    let registry = IndexRegistry::with_defaults();
    let mut diag = Diagnostics::new();
    let cache = build_cache(config, &registry, &mut diag)?;
    diag.dump();

    let policy = Policy::new(&config.policy)?;
    let mut session = Session::new(&cache, &policy, config)?;

    let report = match request {
        Request::Install(packages) => {
            for package in &packages {
                session.mark_install(package)?;
            }
            session.resolve(true)
        }
        Request::Remove(packages) => {
            for package in &packages {
                session.mark_delete(package, config.apply.purge)?;
            }
            session.resolve(true)
        }
        Request::Upgrade { dist } => session.upgrade(dist),
    };
    session.diagnostics_mut().dump();
    let report = report?;
    info!("Resolved in {} passes", report.iterations);

    let stats = session.stats();
    let (ops, _) = session.ordered_transaction()?;
    for (name, by) in &stats.replaced_by {
        println!("{} is replaced by {}", name, by);
    }
    println!("{}", stats);
    if !stats.has_changes() {
        return Ok(());
    }

    if simulate {
        for op in &ops {
            println!("{}", op.describe(&cache));
        }
        return Ok(());
    }

    let mut manager = PackageManager::new(
        LocalArchives::new(&config.apply.archives_dir),
        RpmInstaller::new(&config.rpm),
        &config.apply,
    );
    let outcome = session.apply(&mut manager)?;
    session.diagnostics_mut().dump();
    match outcome.result {
        OrderResult::Completed => Ok(()),
        OrderResult::Incomplete => {
            println!("{} packages were skipped", outcome.skipped.len());
            Ok(())
        }
        OrderResult::Failed => match outcome.error {
            Some(e) => Err(e.into()),
            None => bail!("Transaction failed"),
        },
    }
}

fn check(config: &Config) -> Result<()> {
    let registry = IndexRegistry::with_defaults();
    let mut diag = Diagnostics::new();
    let cache = build_cache(config, &registry, &mut diag)?;
    diag.dump();

    let policy = Policy::new(&config.policy)?;
    let session = Session::new(&cache, &policy, config)?;
    let problems = session.problems();
    if problems.is_empty() {
        println!("No broken packages");
        return Ok(());
    }
    println!("The following packages have unmet dependencies:");
    for problem in &problems {
        println!("  {}", problem);
    }
    bail!("{} broken packages", problems.len())
}
