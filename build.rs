// build.rs

use clap::{Arg, ArgAction, ArgGroup, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn path_arg(id: &'static str, short: char, help: &'static str) -> Arg {
    Arg::new(id)
        .short(short)
        .long(id)
        .value_name("PATH")
        .help(help)
}

fn build_cli() -> Command {
    Command::new("repod")
        .version(env!("CARGO_PKG_VERSION"))
        .author("repod Contributors")
        .about("Manage pacman package repositories stored on this host")
        .arg(
            path_arg(
                "query",
                'Q',
                "List repositories, the children of a path, or the packages of a repository",
            )
            .num_args(0..=1)
            .default_missing_value(""),
        )
        .arg(path_arg("add", 'A', "Add the package given with --file to a repository").requires("file"))
        .arg(path_arg("show", 'S', "Show a package record").requires("package"))
        .arg(path_arg("remove", 'R', "Remove a package and its signature").requires("package"))
        .arg(
            path_arg("copy", 'C', "Copy a package to the repository given with --target")
                .requires_all(["package", "target"]),
        )
        .arg(
            path_arg(
                "edit",
                'E',
                "Replace a package with --file, or copy it to another epoch with --change-epoch",
            )
            .requires("package"),
        )
        .arg(
            Arg::new("listen")
                .long("listen")
                .value_name("ADDR")
                .help("Serve the HTTP API on this address"),
        )
        .arg(
            Arg::new("completions")
                .long("completions")
                .value_name("SHELL")
                .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                .help("Print a completion script for this shell"),
        )
        .group(
            ArgGroup::new("mode")
                .required(true)
                .args(["query", "add", "show", "remove", "copy", "edit", "listen", "completions"]),
        )
        .arg(Arg::new("package").help("Package name, or the exact file name of a package"))
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .help("Package file to upload"),
        )
        .arg(
            Arg::new("target")
                .short('t')
                .long("target")
                .value_name("PATH")
                .help("Destination repository path for --copy"),
        )
        .arg(
            Arg::new("change_epoch")
                .long("change-epoch")
                .value_name("EPOCH")
                .help("Destination epoch for --edit"),
        )
        .arg(
            Arg::new("file_path")
                .long("file-path")
                .action(ArgAction::SetTrue)
                .help("Print the path of the package file instead of its record"),
        )
        .arg(
            Arg::new("force")
                .long("force")
                .action(ArgAction::SetTrue)
                .help("Replace an existing package with the same name and version"),
        )
        .arg(
            Arg::new("system")
                .long("system")
                .value_name("SYSTEM")
                .help("Package-manager family, detected from the path when omitted"),
        )
        .arg(
            Arg::new("root")
                .long("root")
                .env("REPOD_ROOT")
                .default_value("/srv/http")
                .help("Repositories root"),
        )
        .arg(Arg::new("gpg").long("gpg").env("REPOD_GPG").default_value("gpg").help("gpg executable"))
        .arg(
            Arg::new("signing_key")
                .long("signing-key")
                .env("REPOD_GPG_KEY")
                .value_name("KEYID")
                .help("Key id used for package signatures"),
        )
        .arg(
            Arg::new("repo_add")
                .long("repo-add")
                .env("REPOD_REPO_ADD")
                .default_value("repo-add")
                .help("repo-add executable"),
        )
        .arg(
            Arg::new("repo_remove")
                .long("repo-remove")
                .env("REPOD_REPO_REMOVE")
                .default_value("repo-remove")
                .help("repo-remove executable"),
        )
        .arg(
            Arg::new("pacman")
                .long("pacman")
                .env("REPOD_PACMAN")
                .default_value("pacman")
                .help("pacman executable"),
        )
        .arg(
            Arg::new("tool_timeout")
                .long("tool-timeout")
                .env("REPOD_TOOL_TIMEOUT")
                .value_name("SECONDS")
                .default_value("300")
                .help("Deadline in seconds for each external tool invocation (0 disables it)"),
        )
        .arg(
            Arg::new("scratch_dir")
                .long("scratch-dir")
                .env("REPOD_SCRATCH_DIR")
                .value_name("DIR")
                .help("Directory for temporary query environments"),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("repod.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
