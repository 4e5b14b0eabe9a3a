//! stackcheck CLI
//!
//! Runs the site stack's integration scenarios and exits non-zero when any
//! scenario that actually ran failed.

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stackcheck::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, tearing down live infrastructure before exit");
            signal.cancel();
        }
    });

    match cli.run(shutdown).await {
        Ok(summary) => ExitCode::from(summary.exit_code()),
        Err(e) => {
            error!(error = %e, "stackcheck failed");
            ExitCode::from(2)
        }
    }
}
