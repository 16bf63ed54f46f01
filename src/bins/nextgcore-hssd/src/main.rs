//! NextGCore HSS (Home Subscriber Server)
//!
//! Serves the Cx identity registry for the IMS core and subscriber data
//! lookups from MongoDB or an in-memory store.

use anyhow::{Context, Result};
use clap::Parser;
use nextgcore_hssd::{HssConfig, HssContext, PoolConfig};
use ogs_dbi::{MemoryDbi, MongoDbi, SubscriberDb};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// NextGCore HSS - Home Subscriber Server
#[derive(Parser, Debug)]
#[command(name = "nextgcore-hssd")]
#[command(author = "NextGCore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "IMS Home Subscriber Server", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, default_value = "/etc/nextgcore/hss.yaml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'e', long, default_value = "info")]
    log_level: String,

    /// Disable color output
    #[arg(short = 'm', long)]
    no_color: bool,

    /// Maximum number of UEs; overrides global.max.ue
    #[arg(long)]
    max_ue: Option<usize>,

    /// Database URI (MongoDB); overrides db_uri
    #[arg(long)]
    db_uri: Option<String>,

    /// Database name
    #[arg(long, default_value = "nextgcore")]
    db_name: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    log::info!("NextGCore HSS v{} starting...", env!("CARGO_PKG_VERSION"));

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let config = load_config(&args)?;
    let db = open_db(&config, &args.db_name)?;

    let ctx = HssContext::init(config, db);
    log::info!("NextGCore HSS ready");

    run_event_loop(&shutdown);

    log::info!("Shutting down...");
    ctx.fini();

    log::info!("NextGCore HSS stopped");
    Ok(())
}

/// Initialize logging based on command line arguments
fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(parse_level(&args.log_level));
    builder.format_timestamp_millis();

    if args.no_color {
        builder.write_style(env_logger::WriteStyle::Never);
    }

    builder.init();
}

fn parse_level(level: &str) -> log::LevelFilter {
    level.parse().unwrap_or(log::LevelFilter::Info)
}

/// Load the configuration file and apply command line overrides
///
/// A missing file falls back to defaults, which still have to pass
/// validation, so startup aborts without a usable Diameter setup.
fn load_config(args: &Args) -> Result<HssConfig> {
    let mut config = if Path::new(&args.config).exists() {
        HssConfig::load(&args.config)
            .with_context(|| format!("Failed to load configuration {}", args.config))?
    } else {
        log::warn!("Configuration file not found: {}", args.config);
        HssConfig::default()
    };

    if let Some(max_ue) = args.max_ue {
        config.pool = PoolConfig::from_max_ue(max_ue);
    }
    if let Some(db_uri) = &args.db_uri {
        config.db_uri = Some(db_uri.clone());
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn open_db(config: &HssConfig, db_name: &str) -> Result<Box<dyn SubscriberDb>> {
    match &config.db_uri {
        Some(db_uri) => {
            let db = MongoDbi::connect(db_uri, db_name).context("Failed to connect to MongoDB")?;
            log::info!("MongoDB connected [{}]", db.masked_db_uri());
            Ok(Box::new(db))
        }
        None => {
            log::warn!("No db_uri configured, using in-memory subscriber store");
            Ok(Box::new(MemoryDbi::new()))
        }
    }
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        shutdown.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    Ok(())
}

/// Block until shutdown is requested
fn run_event_loop(shutdown: &AtomicBool) {
    log::debug!("Entering main event loop");

    let poll_interval = Duration::from_millis(100);
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(poll_interval);
    }

    log::debug!("Exiting main event loop");
}
