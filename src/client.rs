//! Client side of the line protocol.
//!
//! Opens a connection, sends one command line, reads one response line,
//! and closes the connection.

use std::fmt;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::protocol;

/// One completed request/response pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub request: String,
    /// `None` when the server closed without sending a line
    pub response: Option<String>,
}

/// Client failures
#[derive(Debug)]
pub enum ClientError {
    Connect { addr: String, source: io::Error },
    Io(io::Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Connect { addr, source } => {
                write!(f, "failed to connect to {addr}: {source}")
            }
            ClientError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Connect { source, .. } => Some(source),
            ClientError::Io(e) => Some(e),
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(e: io::Error) -> Self {
        ClientError::Io(e)
    }
}

/// Send `command` to `server:port` and wait for the single response line.
pub async fn send_request(server: &str, port: u16, command: &str) -> Result<Exchange, ClientError> {
    let addr = format!("{server}:{port}");
    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|source| ClientError::Connect {
            addr: addr.clone(),
            source,
        })?;
    debug!(%addr, "Connected");

    let (reader, mut writer) = stream.into_split();

    writer.write_all(&protocol::encode_line(command)).await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;

    let response = (n > 0).then(|| protocol::strip_line_ending(&line).to_string());

    Ok(Exchange {
        request: command.to_string(),
        response,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_send_request_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            stream.write_all(b"pong\r\n").await.unwrap();
            String::from_utf8(buf[..n].to_vec()).unwrap()
        });

        let exchange = send_request("127.0.0.1", port, "ping").await.unwrap();
        assert_eq!(exchange.request, "ping");
        assert_eq!(exchange.response.as_deref(), Some("pong"));
        assert_eq!(server.await.unwrap(), "ping\n");
    }

    #[tokio::test]
    async fn test_server_closes_without_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64];
            let _ = stream.read(&mut buf).await;
        });

        let exchange = send_request("127.0.0.1", port, "TIME").await.unwrap();
        assert_eq!(exchange.response, None);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        match send_request("127.0.0.1", port, "TIME").await {
            Err(ClientError::Connect { addr, .. }) => {
                assert_eq!(addr, format!("127.0.0.1:{port}"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
