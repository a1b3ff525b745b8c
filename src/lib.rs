//! lineinfo: a one-exchange-per-connection TCP information service.
//!
//! A client connects, sends one line, and gets one line back:
//! - `TIME`: current local date and time (`MM/dd/yyyy HH:mm:ss`)
//! - `VENDOR`: host platform identifier
//! - `VERSION`: server runtime version
//!
//! Anything else is answered with `Unknown request: <TOKEN>`, and an empty
//! line with `Invalid request`. The connection is closed after the reply.

pub mod client;
pub mod config;
pub mod observer;
pub mod protocol;
pub mod server;

pub use observer::{Observer, ServerEvent, TracingObserver};
pub use server::{Listener, ServerError};
