//! lineinfo client binary: sends one command and prints the response.

use clap::Parser;
use lineinfo::client;
use lineinfo::config::ClientArgs;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ClientArgs::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let exchange = match client::send_request(&args.server, args.port, &args.command).await {
        Ok(exchange) => exchange,
        Err(e) => {
            warn!("Error: {e}");
            return Err(e.into());
        }
    };

    info!("Sent request: {}", exchange.request);
    match exchange.response {
        Some(response) => {
            info!("Received response: {response}");
            println!("{response}");
        }
        None => warn!("Server closed the connection without a response"),
    }

    Ok(())
}
