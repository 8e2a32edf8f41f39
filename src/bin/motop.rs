//! motop - top-like console for MongoDB fleets.
//!
//! Usage:
//!   motop                          # servers from ~/.config/motop.toml, 1 second interval
//!   motop 5                        # 5 second interval
//!   motop --server db1=10.0.0.1    # add a server on the command line
//!   motop --demo                   # built-in mock fleet

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use motop::collector::Sampler;
use motop::collector::mock::demo_fleet;
use motop::collector::sampler::DEFAULT_WORKERS;
use motop::collector::shell::DEFAULT_SHELL;
use motop::config::{self, Config, ConfigError, ServerConfig};
use motop::console::{ConsoleLoop, ConsoleOptions, CrosstermTerminal};
use motop::fleet::Fleet;
use motop::models::DEFAULT_MAX_OPERATIONS;

/// Realtime monitoring of running MongoDB operations.
#[derive(Parser)]
#[command(name = "motop", about = "MongoDB operations monitor", version)]
struct Args {
    /// Refresh interval in seconds (default: 1).
    #[arg(value_name = "INTERVAL", value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,

    /// Config file. Default: $XDG_CONFIG_HOME/motop.toml or ~/.config/motop.toml
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Server to monitor, as NAME=ADDRESS. Repeatable; overrides the config
    /// file entry of the same name.
    #[arg(short, long = "server", value_name = "NAME=ADDRESS", value_parser = parse_server)]
    servers: Vec<(String, ServerConfig)>,

    /// Per-server call timeout in milliseconds.
    #[arg(long, default_value = "3000")]
    timeout_ms: u64,

    /// Number of sampling threads.
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Maximum rows of the operations table.
    #[arg(long, default_value_t = DEFAULT_MAX_OPERATIONS)]
    max_operations: usize,

    /// MongoDB shell used to talk to the servers.
    #[arg(long, default_value = DEFAULT_SHELL)]
    shell: String,

    /// Hide replication operations (oplog tailing, local.sources).
    #[arg(long)]
    hide_replication: bool,

    /// Show replica set members and their lag. Costs two more calls per
    /// server per tick.
    #[arg(long)]
    replication: bool,

    /// Monitor a built-in mock fleet instead of real servers.
    #[arg(long)]
    demo: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only log errors.
    #[arg(short, long)]
    quiet: bool,

    /// Write logs to this file. Nothing is logged without it.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn parse_server(s: &str) -> Result<(String, ServerConfig), String> {
    config::parse_server_arg(s).map_err(|e| e.to_string())
}

/// Initializes the tracing subscriber, writing to `log_file`.
/// The terminal belongs to the console, so without a file nothing is logged.
fn init_logging(verbose: u8, quiet: bool, log_file: Option<&Path>) -> std::io::Result<()> {
    let Some(path) = log_file else {
        return Ok(());
    };
    let file = File::options().create(true).append(true).open(path)?;

    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("motop={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

/// Reads the config file and applies `--server` overrides.
fn load_config(args: &Args) -> Result<(Config, Option<PathBuf>), ConfigError> {
    let (mut config, path) = match &args.config {
        Some(path) => (Config::load(path)?, Some(path.clone())),
        None => match config::default_config_path() {
            Some(path) => (Config::load_optional(&path)?, Some(path)),
            None => (Config::default(), None),
        },
    };
    for (name, server) in &args.servers {
        config.insert(name.clone(), server.clone());
    }
    Ok((config, path))
}

fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(args.verbose, args.quiet, args.log_file.as_deref()) {
        eprintln!("Error: cannot open log file: {}", e);
        std::process::exit(1);
    }

    let interval = Duration::from_secs(args.interval.unwrap_or(1));
    let timeout = Duration::from_millis(args.timeout_ms);

    let fleet: Fleet = if args.demo {
        demo_fleet()
    } else {
        let (settings, path) = match load_config(&args) {
            Ok(loaded) => loaded,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        };
        if settings.is_empty() {
            eprintln!("{}", config::instructions(path.as_deref()));
            std::process::exit(1);
        }
        settings.build_fleet(&args.shell, timeout)
    };

    info!(
        servers = fleet.len(),
        interval_secs = interval.as_secs(),
        timeout_ms = args.timeout_ms,
        demo = args.demo,
        "starting motop"
    );

    let options = ConsoleOptions {
        interval,
        max_operations: args.max_operations,
        hide_replication: args.hide_replication,
        replication: args.replication,
    };
    let mut console = ConsoleLoop::new(fleet, Sampler::new(args.workers, timeout), options);

    // The terminal leaves raw mode when dropped, before any error is printed.
    let result = CrosstermTerminal::new().and_then(|mut terminal| console.run(&mut terminal));
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
