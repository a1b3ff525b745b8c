//! Reporting of server lifecycle and per-connection events.
//!
//! The listener holds no presentation state. Everything a front end might
//! want to show is pushed to an [`Observer`] as a [`ServerEvent`], whose
//! `Display` form is the human-readable log line.

use std::fmt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::server::ServerError;

/// Something that happened in the listener or a connection handler
#[derive(Debug)]
pub enum ServerEvent {
    Started { port: u16 },
    Stopped,
    StartFailed(ServerError),
    AcceptFailed(ServerError),
    Received { request: String },
    Sent { response: String },
    HandlerFailed(ServerError),
}

impl ServerEvent {
    /// Whether the event reports a failure
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ServerEvent::StartFailed(_) | ServerEvent::AcceptFailed(_) | ServerEvent::HandlerFailed(_)
        )
    }
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerEvent::Started { port } => write!(f, "Server started on port: {port}"),
            ServerEvent::Stopped => write!(f, "Server stopped."),
            ServerEvent::StartFailed(e) => write!(f, "Starting server: {e}"),
            ServerEvent::AcceptFailed(e) => write!(f, "Accepting client: {e}"),
            ServerEvent::Received { request } => write!(f, "Received request: {request}"),
            ServerEvent::Sent { response } => write!(f, "Sent response: {response}"),
            ServerEvent::HandlerFailed(e) => write!(f, "Handling client: {e}"),
        }
    }
}

/// Consumer of server events.
///
/// Called from the accept loop and from every connection task, so
/// implementations must be cheap and must not block.
pub trait Observer: Send + Sync + 'static {
    fn report(&self, event: ServerEvent);
}

/// Emits every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn report(&self, event: ServerEvent) {
        if event.is_error() {
            warn!("{event}");
        } else {
            info!("{event}");
        }
    }
}

/// Forwards rendered lines to a channel, e.g. a UI log pane
impl Observer for UnboundedSender<String> {
    fn report(&self, event: ServerEvent) {
        // A closed receiver means nobody is listening any more
        let _ = self.send(event.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_event_lines() {
        assert_eq!(
            ServerEvent::Started { port: 5050 }.to_string(),
            "Server started on port: 5050"
        );
        assert_eq!(ServerEvent::Stopped.to_string(), "Server stopped.");
        assert_eq!(
            ServerEvent::Received { request: "time".to_string() }.to_string(),
            "Received request: time"
        );
        assert_eq!(
            ServerEvent::Sent { response: "Invalid request".to_string() }.to_string(),
            "Sent response: Invalid request"
        );
    }

    #[test]
    fn test_error_events() {
        let event = ServerEvent::HandlerFailed(ServerError::RequestIo(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "reset",
        )));
        assert!(event.is_error());
        assert_eq!(event.to_string(), "Handling client: request I/O failed: reset");
        assert!(!ServerEvent::Stopped.is_error());
    }

    #[tokio::test]
    async fn test_channel_observer() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.report(ServerEvent::Started { port: 1 });
        tx.report(ServerEvent::Stopped);
        assert_eq!(rx.recv().await.unwrap(), "Server started on port: 1");
        assert_eq!(rx.recv().await.unwrap(), "Server stopped.");

        drop(rx);
        tx.report(ServerEvent::Stopped);
    }
}
