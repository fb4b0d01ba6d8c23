//! # syncord
//!
//! Discord gateway client and REST helpers for long-running bots.
//!
//! The core of the crate is the persistent gateway connection manager: it
//! performs the Hello/Identify/Resume handshake, heartbeats at the
//! server-announced interval, tracks the event sequence number, rate-limits
//! outbound frames, and reconnects transparently whenever the transport
//! drops. Everything else is synchronous request/response glue around it.
//!
//! ## Architecture
//!
//! ```text
//! Client (client/)
//!     │
//!     ├── Gateway supervisor (gateway/connection)
//!     │       ├── Handshake state machine
//!     │       ├── Heartbeat scheduler (gateway/heartbeat)
//!     │       └── Send queue pump (gateway/send_queue)
//!     │
//!     ├── EventDispatcher (events/)
//!     │
//!     └── RestClient (rest/)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use syncord::{Client, GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(GatewayConfig::new("my-token", 513)?)?;
//!     client.on("MESSAGE_CREATE", |message| {
//!         println!("message: {message}");
//!     });
//!     client.start().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod presence;
pub mod rest;

pub use client::Client;
pub use config::GatewayConfig;
pub use error::{Error, Result};
pub use events::EventDispatcher;
pub use gateway::{ConnectionState, Gateway, GatewayFrame, Opcode, SessionInfo};
pub use presence::PresenceUpdate;
pub use rest::RestClient;
