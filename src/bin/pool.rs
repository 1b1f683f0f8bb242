use std::{path::PathBuf, process::ExitCode};

use cgi_samples::{
    pool::{config::PoolConfig, PoolManager},
    shutdown::shutdown_signal,
};
use clap::Parser;
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "pool.toml")]
    file: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = match PoolConfig::load(&args.file).await {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    debug!("Starting pool manager with {:?}", config);

    let shutdown = match shutdown_signal() {
        Ok(shutdown) => shutdown,
        Err(e) => {
            error!("Unable to install signal handlers. {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Pool manager process {} managing {} pools",
        std::process::id(),
        config.pools.len()
    );
    PoolManager::new(config).run_until(shutdown).await;
    info!("All pools terminated");

    ExitCode::SUCCESS
}
