//! TCP listener and per-connection request handling.
//!
//! The listener owns the bound socket and runs the accept loop on its own
//! task. Every accepted connection gets a fresh task that reads one line,
//! answers it, and closes the connection.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::observer::{Observer, ServerEvent};
use crate::protocol::{self, Command, HostInfo};

/// Longest request line the handler will read
const MAX_LINE_LENGTH: usize = 1024;

/// Most trailing input drained before closing a connection
const DISCARD_LIMIT: u64 = 64 * 1024;

/// How long a finished connection waits for trailing input
const DISCARD_TIMEOUT: Duration = Duration::from_millis(100);

/// Pending connection queue length for the listening socket
const LISTEN_BACKLOG: i32 = 1024;

/// Server failures. Each one is contained where it happens.
#[derive(Debug)]
pub enum ServerError {
    /// The port could not be bound; the server stays stopped
    Bind { addr: SocketAddr, source: io::Error },
    /// Accepting a connection failed while running; the loop continues
    Accept(io::Error),
    /// Reading the command or writing the response failed
    RequestIo(io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Bind { addr, source } => write!(f, "failed to bind {addr}: {source}"),
            ServerError::Accept(e) => write!(f, "accept failed: {e}"),
            ServerError::RequestIo(e) => write!(f, "request I/O failed: {e}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Bind { source, .. } => Some(source),
            ServerError::Accept(e) | ServerError::RequestIo(e) => Some(e),
        }
    }
}

/// A running (or stopped) server bound to one port
pub struct Listener {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    observer: Arc<dyn Observer>,
}

impl Listener {
    /// Bind `addr` and start accepting connections in the background.
    ///
    /// Must be called from within a Tokio runtime. Returns as soon as the
    /// socket is bound; bind failures are returned to the caller.
    pub fn start(addr: SocketAddr, observer: Arc<dyn Observer>) -> Result<Self, ServerError> {
        Self::start_with_host(addr, HostInfo::detect(), observer)
    }

    /// Like [`Listener::start`], serving the given host information.
    pub fn start_with_host(
        addr: SocketAddr,
        host: HostInfo,
        observer: Arc<dyn Observer>,
    ) -> Result<Self, ServerError> {
        let listener =
            bind_listener(addr).map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let running = Arc::new(AtomicBool::new(true));
        let (shutdown, shutdown_rx) = watch::channel(false);

        observer.report(ServerEvent::Started {
            port: local_addr.port(),
        });

        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&running),
            shutdown_rx,
            Arc::new(host),
            Arc::clone(&observer),
        ));

        Ok(Listener {
            local_addr,
            running,
            shutdown,
            task: Some(task),
            observer,
        })
    }

    /// Address the socket is actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Port the socket is actually bound to
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Whether the accept loop is still admitting connections
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop accepting connections and release the socket.
    ///
    /// Waits for the accept loop to exit, so the port can be bound again as
    /// soon as this returns. In-flight handlers keep running to completion.
    /// Calling it again is a no-op.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        let Some(task) = self.task.take() else {
            return;
        };

        // Receiver already gone means the loop has exited
        let _ = self.shutdown.send(true);

        if let Err(e) = task.await {
            warn!(error = %e, "Accept loop ended abnormally");
        }

        self.observer.report(ServerEvent::Stopped);
    }
}

/// Create the listening socket.
///
/// SO_REUSEADDR lets a stop/start cycle rebind the port while old
/// connections are still in TIME_WAIT.
fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    #[cfg(unix)]
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    TcpListener::from_std(socket.into())
}

/// Accept connections until the running flag is cleared.
async fn accept_loop(
    listener: TcpListener,
    running: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
    host: Arc<HostInfo>,
    observer: Arc<dyn Observer>,
) {
    while running.load(Ordering::SeqCst) {
        tokio::select! {
            biased;

            // Fires on stop() and when the Listener is dropped
            _ = shutdown.changed() => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "New connection");

                    let host = Arc::clone(&host);
                    let observer = Arc::clone(&observer);

                    tokio::spawn(async move {
                        handle_connection(stream, &host, observer.as_ref()).await;
                        trace!(peer = %peer, "Connection closed");
                    });
                }
                // Socket torn down by stop(): expected, not an error
                Err(_) if !running.load(Ordering::SeqCst) => break,
                Err(e) => observer.report(ServerEvent::AcceptFailed(ServerError::Accept(e))),
            },
        }
    }

    debug!("Accept loop finished");
}

/// Serve exactly one request on `stream`, then close it.
///
/// I/O failures are reported to the observer and never propagate. The
/// stream is consumed, so it is closed on every path.
pub async fn handle_connection<S>(stream: S, host: &HostInfo, observer: &dyn Observer)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = exchange(stream, host, observer).await {
        observer.report(ServerEvent::HandlerFailed(e));
    }
}

/// Read one line, dispatch it, write one line.
async fn exchange<S>(stream: S, host: &HostInfo, observer: &dyn Observer) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader.take(MAX_LINE_LENGTH as u64));
    let mut raw = Vec::with_capacity(64);

    let n = reader
        .read_until(b'\n', &mut raw)
        .await
        .map_err(ServerError::RequestIo)?;

    // The limit may split a multi-byte character, and clients may send
    // non-UTF-8 text; both decode lossily instead of failing the request.
    let line = String::from_utf8_lossy(&raw);

    // EOF before any data: no line at all
    let request = (n > 0).then(|| protocol::strip_line_ending(&line));
    let command = Command::parse(request);
    trace!(?command, "Processing command");

    let response = protocol::respond(&command, host);

    observer.report(ServerEvent::Received {
        request: request.unwrap_or_default().to_string(),
    });

    writer
        .write_all(&protocol::encode_line(&response))
        .await
        .map_err(ServerError::RequestIo)?;
    writer.shutdown().await.map_err(ServerError::RequestIo)?;

    observer.report(ServerEvent::Sent { response });

    discard_unread(reader.into_inner().into_inner()).await;

    Ok(())
}

/// Swallow input the client sent past the first line.
///
/// Closing a socket with unread data makes the kernel send RST, which can
/// destroy the response before the client reads it. Nothing read here is
/// interpreted.
async fn discard_unread<R>(reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut rest = reader.take(DISCARD_LIMIT);
    let drained =
        tokio::time::timeout(DISCARD_TIMEOUT, tokio::io::copy(&mut rest, &mut tokio::io::sink()))
            .await;
    if let Ok(Ok(n)) = drained {
        if n > 0 {
            trace!(bytes = n, "Discarded input after the first line");
        }
    }
}
