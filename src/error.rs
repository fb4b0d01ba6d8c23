//! Client error types.
//!
//! [`Error`] is the central error type for the crate. Runtime transport
//! failures are recovered internally by the connection supervisor; the
//! variants here surface at the public API boundary (configuration, REST
//! calls, enqueueing while disconnected).

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Client-side error enum.
///
/// Only [`Error::Config`] is fatal by design: it is a caller error detected
/// before any connection attempt. Everything else is either a one-shot REST
/// failure or a transient transport condition that the gateway supervisor
/// recovers from on its own.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or missing configuration (token, intents). Never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// WebSocket transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame could not be encoded or decoded.
    #[error("malformed gateway frame: {0}")]
    Decode(#[from] serde_json::Error),

    /// An inbound frame carried an opcode outside the protocol table.
    #[error("unknown gateway opcode: {0}")]
    UnknownOpcode(u8),

    /// An operation required an open gateway connection.
    #[error("gateway is not connected")]
    NotConnected,

    /// HTTP-level failure from the REST collaborator.
    #[error("rest request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote API rejected a REST request.
    #[error("api error: status {status}: {body}")]
    Api {
        /// HTTP status code returned by the API.
        status: u16,
        /// Response body, if any.
        body: String,
    },
}
