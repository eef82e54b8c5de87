//! bw - command line front end for burrow

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use burrow::backends::{self, LocalBackend, StorageBackend};
use burrow::config::Config;
use burrow::errors::{AppError, AppResult};
use burrow::git::GitStatusSource;
use burrow::operations::{
    Operation, OperationError, OperationEvent, OperationKind, Outcome, TreeLayout,
    delete_entries, generate_tree,
};
use burrow::state::{Navigator, StateStore, TomlStateStore};
use burrow::status::{StatusCache, StatusWorkers};

/// How long `ls` waits for the listing and status badges
const LOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "bw", version, about = "Browse local, FTP and HTTP index directories")]
struct Cli {
    /// Configuration file (default: platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Address for a diagnostics endpoint
    #[arg(long, global = true)]
    diagnostics: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a directory (the last visited one when LOCATION is omitted)
    Ls {
        /// Path, URL or saved connection name
        location: Option<String>,
        /// Show hidden entries
        #[arg(short, long)]
        all: bool,
    },
    /// Delete entries of a directory, stopping at the first failure
    Rm {
        /// Directory containing the entries
        location: String,
        /// Entry names
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Create a nested tree of directories
    MkdirTree {
        /// Directory to create the tree in
        location: String,
        /// Directories per node
        #[arg(long, default_value_t = 2)]
        breadth: usize,
        /// Levels below LOCATION
        #[arg(long, default_value_t = 2)]
        depth: usize,
        /// Name template with {level} and {index} placeholders
        #[arg(long, default_value = "dir_{level}_{index}")]
        template: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!("bw v{} starting", env!("CARGO_PKG_VERSION"));
    if let Some(addr) = &cli.diagnostics {
        info!(addr = %addr, "diagnostics endpoint requested; navigation is unaffected");
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("bw: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> AppResult<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    match cli.command {
        Command::Ls { location, all } => list(&config, location.as_deref(), all),
        Command::Rm { location, names } => remove(&config, &location, &names),
        Command::MkdirTree {
            location,
            breadth,
            depth,
            template,
        } => make_tree(
            &config,
            &location,
            TreeLayout {
                breadth,
                depth,
                template,
            },
        ),
    }
}

/// Resolve a saved connection name, path or URL
fn open(config: &Config, location: &str) -> AppResult<(Arc<dyn StorageBackend>, String)> {
    let location = config.connection(location).unwrap_or(location);
    backends::from_location(location, config)
}

fn list(config: &Config, location: Option<&str>, all: bool) -> AppResult<()> {
    let mut navigator = Navigator::new();
    if config.status.enabled {
        navigator = navigator.with_status(
            Arc::new(StatusCache::new()),
            StatusWorkers::spawn(Arc::new(GitStatusSource::new()), config.status.workers),
        );
    }
    let store = if config.general.remember_path {
        TomlStateStore::default_location()
    } else {
        None
    };
    let saved = store.as_ref().and_then(|s| s.load());
    if let Some(store) = store {
        navigator = navigator.with_state_store(Box::new(store));
    }

    match location {
        Some(location) => {
            let (backend, path) = open(config, location)?;
            navigator.navigate_to(backend, &path, true);
        }
        None => {
            let local: Arc<dyn StorageBackend> = Arc::new(LocalBackend::new());
            let mut candidates = vec![Arc::clone(&local)];
            candidates.extend(
                config
                    .connections
                    .iter()
                    .filter_map(|c| backends::from_location(&c.url, config).ok())
                    .map(|(backend, _)| backend),
            );
            if let Some(state) = &saved
                && let Ok((backend, _)) = backends::from_location(&state.backend_root_url, config)
            {
                candidates.push(backend);
            }

            let restored = saved
                .as_ref()
                .is_some_and(|state| navigator.restore(&candidates, state));
            if !restored {
                navigator.navigate_to(local, "~", true);
            }
        }
    }

    if !navigator.run_until_idle(LOAD_TIMEOUT) {
        warn!("gave up waiting for background work");
    }

    if let Some(failure) = navigator.last_failure() {
        return Err(AppError::Location {
            location: failure.path.clone(),
            reason: failure.message.clone(),
        });
    }
    let Some(snapshot) = navigator.current() else {
        return Ok(());
    };

    let trail: Vec<_> = navigator
        .breadcrumbs()
        .into_iter()
        .map(|c| c.label)
        .collect();
    println!("{}", trail.join(" / "));

    for entry in snapshot.children() {
        if entry.is_hidden() && !all {
            continue;
        }
        let full = snapshot.store().join_path(snapshot.path(), entry.name());
        let badge = navigator.status_text(&full);
        let suffix = if entry.is_dir() { "/" } else { "" };
        if badge.is_empty() {
            println!("{}{}", entry.name(), suffix);
        } else {
            println!("{}{}  {}", entry.name(), suffix, badge);
        }
    }
    Ok(())
}

fn progress_logger() -> Box<dyn FnMut(OperationEvent) + Send> {
    Box::new(|event| {
        if let OperationEvent::Progress(p) = event
            && !p.processing.is_empty()
        {
            info!(
                "[{}/{}] {}",
                p.done + p.failed + p.skipped,
                p.total,
                p.processing.join(", ")
            );
        }
    })
}

fn finish(outcome: Outcome) -> AppResult<()> {
    match outcome {
        Outcome::Completed => Ok(()),
        Outcome::Failed(e) => Err(e.into()),
        Outcome::Cancelled => Err(OperationError::Cancelled.into()),
    }
}

fn remove(config: &Config, location: &str, names: &[String]) -> AppResult<()> {
    let (backend, dir) = open(config, location)?;
    let paths: Vec<String> = names.iter().map(|n| backend.join_path(&dir, n)).collect();
    let count = paths.len();

    let handle = Operation::run(
        OperationKind::Delete,
        move |ctx| delete_entries(ctx, backend.as_ref(), &paths),
        Some(progress_logger()),
    );
    finish(handle.wait())?;
    println!("deleted {} entries", count);
    Ok(())
}

fn make_tree(config: &Config, location: &str, layout: TreeLayout) -> AppResult<()> {
    let (backend, root) = open(config, location)?;
    let total = layout.total();

    let handle = Operation::run(
        OperationKind::GenerateTree,
        move |ctx| generate_tree(ctx, backend.as_ref(), &root, &layout),
        Some(progress_logger()),
    );
    finish(handle.wait())?;
    println!("created {} directories", total);
    Ok(())
}
