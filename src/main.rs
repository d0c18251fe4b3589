//! rToken Relay - cross-chain relay for liquid staking tokens
//!
//! Loads the chain configuration, builds a connector for every chain, and
//! runs them under the supervisor until a fatal error or a termination
//! signal.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info};

use rtoken_relay::chain::ChainRegistry;
use rtoken_relay::config::{Settings, DEFAULT_CONFIG_PATH};
use rtoken_relay::metrics::MetricsServer;

const LOG_FILE_NAME: &str = "relay.log";

#[derive(Parser)]
#[command(name = "rtoken-relay")]
#[command(about = "Relay rToken messages between chains", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay
    Start {
        /// Path to the JSON configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Log filter, overridden by RUST_LOG
        #[arg(long, default_value = "info")]
        log_level: String,
    },
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config, log_level } => start(&config, &log_level).await,
        Commands::Version => {
            let version = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "commit": option_env!("GIT_COMMIT"),
            });
            println!("{}", serde_json::to_string_pretty(&version)?);
            Ok(())
        }
    }
}

async fn start(config: &Path, log_level: &str) -> Result<()> {
    let settings = Settings::load(config)?;
    init_logging(log_level, settings.log_file_path.as_deref())?;

    info!("Starting rToken Relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from {}", config.display());

    let metrics_handle = settings.metrics_port.map(|port| {
        let server = MetricsServer::new(port);
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        })
    });

    let registry = ChainRegistry::with_builtin();
    let mut core = registry
        .assemble(&settings)
        .await
        .context("Failed to build chains")?;
    info!("{} chains registered", core.chains().len());

    let result = core.start().await;

    if let Some(h) = metrics_handle {
        h.abort();
    }

    match result {
        Ok(()) => {
            info!("rToken Relay stopped");
            Ok(())
        }
        Err(e) => {
            error!("rToken Relay stopped with error: {}", e);
            Err(e.into())
        }
    }
}

fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},hyper=warn", level))
    });

    let file_layer = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let path = dir.join(LOG_FILE_NAME);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().json().with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(file_layer)
        .init();

    Ok(())
}
