// gh-proxy binary.
// Loads configuration and runs the HTTP service.

use std::process::ExitCode;

use gh_proxy::{Config, observability, server};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("gh-proxy: {}", e);
            return ExitCode::from(2);
        }
    };
    observability::init_tracing(&config.logging.level);

    match server::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}
