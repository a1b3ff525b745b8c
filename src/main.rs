//! lineinfo server binary.
//!
//! Binds the configured port, serves requests until Ctrl-C, then stops the
//! listener cleanly.

use lineinfo::config::Config;
use lineinfo::{Listener, Observer, ServerEvent, TracingObserver};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        "Starting lineinfo server"
    );

    let observer: Arc<dyn Observer> = Arc::new(TracingObserver);

    let mut listener = match Listener::start(config.listen_addr(), Arc::clone(&observer)) {
        Ok(listener) => listener,
        Err(e) => {
            let message = e.to_string();
            observer.report(ServerEvent::StartFailed(e));
            return Err(message.into());
        }
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    listener.stop().await;
    Ok(())
}
