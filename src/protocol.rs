//! Line protocol command parser and response generator.
//!
//! One exchange per connection:
//! - Client sends one line: `TIME`, `VENDOR`, `VERSION` or anything else
//! - Server answers one line and closes the connection
//!
//! Commands are case-insensitive and surrounding whitespace is ignored.
//!
//! ```text
//! Request:  time\n
//! Response: 10/19/2026 14:03:27\n
//!
//! Request:  banana\n
//! Response: Unknown request: BANANA\n
//! ```

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Local, TimeZone};

/// Format used for the TIME response (`MM/dd/yyyy HH:mm:ss`)
pub const TIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Response for an empty, whitespace-only or absent request line
pub const INVALID_REQUEST: &str = "Invalid request";

/// Parsed request command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Current local date and time
    Time,
    /// Host platform vendor identifier
    Vendor,
    /// Server runtime version
    Version,
    /// Non-empty token that matches no known command (already normalized)
    Unknown(String),
    /// Empty, whitespace-only, or no line at all
    Invalid,
}

impl Command {
    /// Parse a request line.
    ///
    /// `None` means the stream ended before a line was available; it is
    /// treated the same as an empty line.
    pub fn parse(line: Option<&str>) -> Self {
        let token = match line.map(str::trim) {
            Some(token) if !token.is_empty() => token.to_uppercase(),
            _ => return Command::Invalid,
        };

        match token.as_str() {
            "TIME" => Command::Time,
            "VENDOR" => Command::Vendor,
            "VERSION" => Command::Version,
            _ => Command::Unknown(token),
        }
    }
}

/// Host-derived values served by VENDOR and VERSION
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub vendor: String,
    pub version: String,
}

impl HostInfo {
    /// Describe the host this process runs on
    pub fn detect() -> Self {
        HostInfo {
            vendor: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            version: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Compute the response line for a command using the current local time.
pub fn respond(command: &Command, host: &HostInfo) -> String {
    respond_at(command, host, &Local::now())
}

/// Compute the response line for a command at a fixed instant.
pub fn respond_at<Tz>(command: &Command, host: &HostInfo, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    match command {
        Command::Time => format_time(now),
        Command::Vendor => host.vendor.clone(),
        Command::Version => host.version.clone(),
        Command::Unknown(token) => format!("Unknown request: {token}"),
        Command::Invalid => INVALID_REQUEST.to_string(),
    }
}

/// Render a timestamp as `MM/dd/yyyy HH:mm:ss`
pub fn format_time<Tz>(now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    now.format(TIME_FORMAT).to_string()
}

/// Frame a response as a single newline-terminated line.
pub fn encode_line(response: &str) -> BytesMut {
    let mut buf = BytesMut::with_capacity(response.len() + 1);
    buf.extend_from_slice(response.as_bytes());
    buf.put_u8(b'\n');
    buf
}

/// Strip a trailing `\n` or `\r\n` from a line read off the wire.
pub fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
