use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use tracing::{debug, error, info};

use crate::{
    config::Config, listener::bind, responder::Responder, server::Server,
    shutdown::shutdown_signal,
};

#[derive(Parser, Debug)]
pub struct Args {
    /// Port to listen on
    pub port: u16,
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Interface to bind, overrides the configuration file
    #[arg(long)]
    pub host: Option<String>,
}

impl Args {
    /// Parses the command line. Usage errors are printed to stderr and end
    /// the process with status 1, help and version keep clap's behavior.
    pub fn parse_or_exit() -> Args {
        match Args::try_parse() {
            Ok(args) => args,
            Err(e) if e.use_stderr() => {
                let _ = e.print();
                std::process::exit(1);
            }
            Err(e) => e.exit(),
        }
    }
}

/// Starts a server answering with the responder built by `make_responder`
/// from the process id, until SIGINT or SIGTERM.
pub async fn run<R, F>(args: Args, make_responder: F) -> ExitCode
where
    R: Responder,
    F: FnOnce(u32) -> R,
{
    let pid = std::process::id();

    let mut config = match Config::load(args.config.as_deref()).await {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    debug!("Starting with {:?}", config);

    let responder = make_responder(pid);
    let name = responder.name().to_string();

    let shutdown = match shutdown_signal() {
        Ok(shutdown) => shutdown,
        Err(e) => {
            error!("Unable to install signal handlers. {e}");
            return ExitCode::FAILURE;
        }
    };

    let listener = match bind(&config, args.port) {
        Ok(listener) => listener,
        Err(e) => {
            error!("Unable to start {name} process on port {}. {e}", args.port);
            return ExitCode::FAILURE;
        }
    };
    let server = Server::new(listener, responder, config);
    let port = server
        .local_addr()
        .map_or(args.port, |addr| addr.port());

    info!("{name} process {pid} listening on port {port}");
    server.run_until(shutdown).await;
    info!("{name} process {pid} shutting down");

    ExitCode::SUCCESS
}
