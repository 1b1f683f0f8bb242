use std::process::ExitCode;

use cgi_samples::{cli::Args, cli::run, search::QueryResponder};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse_or_exit();
    run(args, QueryResponder::new).await
}
