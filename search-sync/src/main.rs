//! Search sync service.
//!
//! Keeps the configured search index in sync with the monitored tables of a
//! SQLite database until interrupted.

use std::env;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use search_sync::{Dependencies, Settings, SyncError};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run() -> Result<(), SyncError> {
    let settings = Settings::from_env()?;
    let deps = Dependencies::new(&settings).await?;

    deps.factory.start().await?;
    info!(factory = %deps.factory.name(), "Search sync running");

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    deps.factory.stop().await;
    info!("Search sync shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Search sync failed");
            ExitCode::FAILURE
        }
    }
}
