use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use wayfarer::cli::Cli;
use wayfarer::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with filters to suppress noisy chromiumoxide errors.
    // These occur when Chrome sends CDP events the library doesn't recognize
    // (common with newer Chrome versions) and are harmless.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info")
            .add_directive("chromiumoxide::conn=warn".parse().unwrap())
            .add_directive("chromiumoxide::handler=warn".parse().unwrap())
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let cli = Cli::parse();
    cli.run().await
}
