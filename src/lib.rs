//! ottd-admin - OpenTTD admin port client core
//!
//! Arsitektur:
//! - Protocol: packet registry, binary layouts, typed field mappings
//! - Core: synchronous observer events
//! - Network: readiness-driven poll loop over one admin connection
//!
//! ```no_run
//! use ottd_admin::network::{AdminClient, ClientConfig, PollOutcome, StreamConnection};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::default();
//! let conn = StreamConnection::connect("127.0.0.1:3977", &config)?;
//! let mut client = AdminClient::attach(conn, config)?;
//! client.map_info_received().on(|info| {
//!     println!("map: {:?}", info.get_str("map_name"));
//!     Ok(())
//! });
//! while let PollOutcome::Packets(_) = client.poll()? {}
//! # Ok(())
//! # }
//! ```

#![cfg(unix)]

pub mod core;
pub mod network;
pub mod protocol;
