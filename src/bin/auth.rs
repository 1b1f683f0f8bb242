use std::process::ExitCode;

use cgi_samples::{auth::TokenIssuer, cli::Args, cli::run};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse_or_exit();
    run(args, TokenIssuer::new).await
}
