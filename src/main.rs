// src/main.rs

use anyhow::{Context, Result};
use clap::{ArgGroup, CommandFactory, Parser};
use clap_complete::Shell;
use repod::config::{Config, DEFAULT_ROOT, ToolPaths};
use repod::locator::{Locator, System};
use repod::repository::{self, AddedPackage, RepositoryFacade};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "repod")]
#[command(author, version, about = "Manage pacman package repositories stored on this host", long_about = None)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["query", "add", "show", "remove", "copy", "edit", "listen", "completions"])
))]
#[command(group(ArgGroup::new("edit_source").args(["file", "change_epoch"])))]
struct Cli {
    /// List repositories, the children of a path, or the packages of a repository
    #[arg(short = 'Q', long, value_name = "PATH", num_args = 0..=1, default_missing_value = "")]
    query: Option<String>,

    /// Add the package given with --file to a repository
    #[arg(short = 'A', long, value_name = "PATH", requires = "file")]
    add: Option<String>,

    /// Show a package record
    #[arg(short = 'S', long, value_name = "PATH", requires = "package")]
    show: Option<String>,

    /// Remove a package and its signature
    #[arg(short = 'R', long, value_name = "PATH", requires = "package")]
    remove: Option<String>,

    /// Copy a package to the repository given with --target
    #[arg(short = 'C', long, value_name = "PATH", requires_all = ["package", "target"])]
    copy: Option<String>,

    /// Replace a package with --file, or copy it to another epoch with --change-epoch
    #[arg(short = 'E', long, value_name = "PATH", requires_all = ["package", "edit_source"])]
    edit: Option<String>,

    /// Serve the HTTP API on this address
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,

    /// Print a completion script for this shell
    #[arg(long, value_name = "SHELL")]
    completions: Option<Shell>,

    /// Package name, or the exact file name of a package
    package: Option<String>,

    /// Package file to upload
    #[arg(short = 'f', long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Destination repository path for --copy
    #[arg(short = 't', long, value_name = "PATH", requires = "copy")]
    target: Option<String>,

    /// Destination epoch for --edit
    #[arg(long, value_name = "EPOCH", requires = "edit")]
    change_epoch: Option<String>,

    /// Print the path of the package file instead of its record
    #[arg(long, requires = "show")]
    file_path: bool,

    /// Replace an existing package with the same name and version
    #[arg(long)]
    force: bool,

    /// Package-manager family, detected from the path when omitted
    #[arg(long, value_name = "SYSTEM")]
    system: Option<System>,

    /// Repositories root
    #[arg(long, env = "REPOD_ROOT", default_value = DEFAULT_ROOT)]
    root: PathBuf,

    /// gpg executable
    #[arg(long, env = "REPOD_GPG", default_value = "gpg")]
    gpg: PathBuf,

    /// Key id used for package signatures
    #[arg(long, env = "REPOD_GPG_KEY", value_name = "KEYID")]
    signing_key: Option<String>,

    /// repo-add executable
    #[arg(long, env = "REPOD_REPO_ADD", default_value = "repo-add")]
    repo_add: PathBuf,

    /// repo-remove executable
    #[arg(long, env = "REPOD_REPO_REMOVE", default_value = "repo-remove")]
    repo_remove: PathBuf,

    /// pacman executable
    #[arg(long, env = "REPOD_PACMAN", default_value = "pacman")]
    pacman: PathBuf,

    /// Deadline in seconds for each external tool invocation (0 disables it)
    #[arg(long, env = "REPOD_TOOL_TIMEOUT", value_name = "SECONDS", default_value_t = 300)]
    tool_timeout: u64,

    /// Directory for temporary query environments
    #[arg(long, env = "REPOD_SCRATCH_DIR", value_name = "DIR")]
    scratch_dir: Option<PathBuf>,
}

impl Cli {
    fn config(&self) -> Config {
        let tools = ToolPaths {
            gpg: self.gpg.clone(),
            repo_add: self.repo_add.clone(),
            repo_remove: self.repo_remove.clone(),
            pacman: self.pacman.clone(),
        };
        let timeout = (self.tool_timeout > 0).then(|| Duration::from_secs(self.tool_timeout));

        let mut config = Config::new(&self.root)
            .with_tools(tools)
            .with_tool_timeout(timeout);
        if let Some(dir) = &self.scratch_dir {
            config = config.with_scratch_dir(dir);
        }
        if let Some(key) = &self.signing_key {
            config = config.with_signing_key(key);
        }
        config
    }

    fn package(&self) -> Result<&str> {
        self.package
            .as_deref()
            .context("a package name is required")
    }

    fn file(&self) -> Result<&Path> {
        self.file.as_deref().context("a package file is required")
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Exit status for a failed run; engine errors carry their own
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<repod::Error>()
        .map(|e| e.kind().exit_code())
        .and_then(|code| u8::try_from(code).ok())
        .unwrap_or(1)
}

fn run(cli: Cli) -> Result<()> {
    if let Some(shell) = cli.completions {
        clap_complete::generate(shell, &mut Cli::command(), "repod", &mut io::stdout());
        return Ok(());
    }

    let config = Arc::new(cli.config());

    if let Some(address) = &cli.listen {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start the async runtime")?;
        runtime.block_on(repod::server::serve(Arc::clone(&config), address))?;
        return Ok(());
    }

    if let Some(path) = &cli.query {
        let locator = Locator::new(config.root.clone(), path)?;
        let listing = repository::list_address(Arc::clone(&config), locator, cli.system)?;
        for name in listing.names {
            println!("{}", name);
        }
        return Ok(());
    }

    if let Some(path) = &cli.add {
        let facade = open(&config, path, cli.system)?;
        let file = cli.file()?;
        let added = upload(&facade, file, cli.force)?;
        print_added(&added);
        return Ok(());
    }

    if let Some(path) = &cli.show {
        let facade = open(&config, path, cli.system)?;
        if cli.file_path {
            println!("{}", facade.fetch_file(cli.package()?)?.display());
        } else {
            println!("{}", facade.describe_package(cli.package()?)?.trim_end());
        }
        return Ok(());
    }

    if let Some(path) = &cli.remove {
        let facade = open(&config, path, cli.system)?;
        let removed = facade.remove_package(cli.package()?)?;
        for file in removed.files {
            println!("{}", file.display());
        }
        return Ok(());
    }

    if let Some(path) = &cli.copy {
        let facade = open(&config, path, cli.system)?;
        let target = cli.target.as_deref().context("a target path is required")?;
        let target = facade.locator().retarget(target)?;
        let added = facade.copy_package(cli.package()?, target, cli.force)?;
        print_added(&added);
        return Ok(());
    }

    if let Some(path) = &cli.edit {
        let facade = open(&config, path, cli.system)?;
        let added = match &cli.change_epoch {
            Some(epoch) => facade.change_epoch(cli.package()?, epoch, cli.force)?,
            None => {
                let file = cli.file()?;
                let name = upload_name(file)?;
                info!("Replacing {} with {}", cli.package()?, name);
                let mut content =
                    File::open(file).with_context(|| format!("failed to open {}", file.display()))?;
                facade.edit_package(cli.package()?, &name, &mut content)?
            }
        };
        print_added(&added);
        return Ok(());
    }

    anyhow::bail!("no mode given")
}

fn open(config: &Arc<Config>, path: &str, system: Option<System>) -> Result<RepositoryFacade> {
    let locator = Locator::new(config.root.clone(), path)?;
    Ok(RepositoryFacade::open(Arc::clone(config), locator, system)?)
}

fn upload_name(file: &Path) -> Result<String> {
    file.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", file.display()))
}

fn upload(facade: &RepositoryFacade, file: &Path, force: bool) -> Result<AddedPackage> {
    let name = upload_name(file)?;
    let mut content =
        File::open(file).with_context(|| format!("failed to open {}", file.display()))?;
    Ok(facade.add_package(&name, &mut content, force)?)
}

fn print_added(added: &AddedPackage) {
    println!("{}", added.path.display());
    println!("{}", added.signature.display());
    println!("sha256 {}", added.sha256);
}
