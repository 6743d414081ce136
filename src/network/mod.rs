//! Network Layer: single-connection poll loop
//!
//! Menggunakan mio (atau `poll(2)` sebagai fallback) untuk readiness
//! notification pada satu socket.
//!
//! Fitur:
//! - Capability-probed multiplexer with a uniform seconds-based timeout
//! - One frame per readiness notification per call
//! - Per-connection dispatch table built from the packet registry

mod client;
mod config;
mod connection;
pub mod multiplexer;

pub use client::{AdminClient, ClientError, PollOutcome, ReceivedPacket};
pub use config::{ClientConfig, ConfigError, DEFAULT_TIMEOUT_SECS, MIN_READ_TIMEOUT};
pub use connection::{AdminConnection, SocketStream, StreamConnection};
pub use multiplexer::{BackendKind, Multiplexer, Readiness};
