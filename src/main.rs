//! The `pake` CLI: Pakefile auto-discovery, default-target resolution,
//! `--graph` dependency printing, and single-target-per-loop-iteration
//! building with a target-chain error report on failure.

use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use pake::api::{
    load_pakefile, print_graph, Console, PakeError, RebuildMode, Registry,
};

/// Candidate filenames tried, in order, when `--pakefile` is not given.
const PAKEFILE_CANDIDATES: &[&str] = &["Pakefile.toml", "pakefile.toml"];

#[derive(Debug, Parser)]
#[command(name = "pake", about = "A general-purpose incremental build orchestrator")]
struct Cli {
    /// Targets to build. If none are given, builds the "default" target.
    targets: Vec<String>,

    /// Path to the Pakefile. Auto-discovered if not given.
    #[arg(short = 'f', long)]
    pakefile: Option<PathBuf>,

    /// Path to the persistent build state file.
    #[arg(long, default_value = ".pake-state")]
    statefile: PathBuf,

    /// Force the requested targets to rebuild, ignoring the cache; their
    /// dependencies still obey the cache.
    #[arg(long)]
    rebuild: bool,

    /// Force the requested targets and every transitive dependency to
    /// rebuild, ignoring the cache entirely.
    #[arg(long = "rebuild-all")]
    rebuild_all: bool,

    /// Print the dependency tree for the requested targets instead of
    /// building them.
    #[arg(long)]
    graph: bool,

    /// Decrease verbosity; may be repeated.
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    quiet: u8,

    /// Increase verbosity; may be repeated.
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let console = Console::new(cli.verbose, cli.quiet, std::io::stderr().is_terminal());

    match run(&cli, &console) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            console.error(&e.to_string());
            if let Some(source) = std::error::Error::source(&e) {
                console.error(&format!("caused by: {source}"));
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, console: &Console) -> Result<(), PakeError> {
    let pakefile_path = discover_pakefile(cli.pakefile.as_deref())?;
    let contents = fs::read_to_string(&pakefile_path).map_err(|e| {
        PakeError::User(format!("failed to read {}: {e}", pakefile_path.display()))
    })?;

    let mut registry = Registry::new(&cli.statefile, *console)?;
    load_pakefile(&contents, &mut registry)?;

    let mut targets = cli.targets.clone();
    if targets.is_empty() {
        if registry.resolves_to_fallback("default")? {
            return Err(PakeError::User(
                "no targets given and no default target defined".to_string(),
            ));
        }
        targets.push("default".to_string());
    }

    if cli.graph {
        let tree = registry.get_deps(&targets)?;
        print_graph(&tree, 0);
        return Ok(());
    }

    let mode = if cli.rebuild_all {
        RebuildMode::Deep
    } else if cli.rebuild {
        RebuildMode::Shallow
    } else {
        RebuildMode::None
    };

    for target in &targets {
        registry.update(target, mode)?;
    }

    Ok(())
}

fn discover_pakefile(explicit: Option<&Path>) -> Result<PathBuf, PakeError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    for candidate in PAKEFILE_CANDIDATES {
        let path = Path::new(candidate);
        if path.exists() {
            return Ok(path.to_path_buf());
        }
    }
    Err(PakeError::User(format!(
        "could not find a Pakefile (tried {})",
        PAKEFILE_CANDIDATES.join(", ")
    )))
}
