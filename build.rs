// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: packages to act on
fn packages_arg() -> Arg {
    Arg::new("packages")
        .required(true)
        .num_args(1..)
        .help("Package names")
}

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .action(ArgAction::SetTrue)
        .help(help)
}

fn change_args(cmd: Command) -> Command {
    cmd.arg(flag("simulate", "Show the planned operations without running rpm").short('s'))
        .arg(flag("purge", "Remove configuration files along with packages"))
        .arg(flag("fix-missing", "Skip packages whose archives are missing"))
}

fn build_cli() -> Command {
    Command::new("rapt")
        .version(env!("CARGO_PKG_VERSION"))
        .author("rapt Contributors")
        .about("APT-style dependency resolution for RPM systems")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .default_value("/etc/rapt/rapt.toml")
                .help("Configuration file"),
        )
        .subcommand_required(true)
        .subcommand(change_args(
            Command::new("install")
                .about("Install packages (name or name=version)")
                .arg(packages_arg())
                .arg(flag("reinstall", "Reinstall packages that are already at the candidate version")),
        ))
        .subcommand(change_args(
            Command::new("remove")
                .about("Remove installed packages")
                .arg(packages_arg()),
        ))
        .subcommand(change_args(
            Command::new("upgrade")
                .about("Upgrade installed packages")
                .arg(flag("dist", "Allow installing and removing packages to complete the upgrade")),
        ))
        .subcommand(Command::new("check").about("Report packages with unsatisfied dependencies"))
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell", "elvish"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("rapt.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
