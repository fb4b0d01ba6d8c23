//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). A typed constructor is also provided
//! for embedding the client in a larger application.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default gateway endpoint (API v10, JSON encoding).
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Default delay before a reconnect attempt after the transport closes.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Top-level client configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`] or built with
/// [`GatewayConfig::new`]. A missing token or intents value is a caller
/// error and fails synchronously before any connection attempt.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bot authentication token.
    pub token: String,

    /// Gateway intents bitfield sent in the Identify payload.
    pub intents: u64,

    /// WebSocket URL of the gateway. Overridable for testing.
    pub gateway_url: String,

    /// Delay between a transport close and the next connect attempt.
    pub reconnect_delay: Duration,

    /// Application ID used by interaction and command REST endpoints.
    pub application_id: Option<String>,
}

impl GatewayConfig {
    /// Builds a configuration from a token and an intents bitfield.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the token is empty.
    pub fn new(token: impl Into<String>, intents: u64) -> Result<Self> {
        let config = Self {
            token: token.into(),
            intents,
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            application_id: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    /// Recognized keys: `DISCORD_TOKEN`, `DISCORD_INTENTS`,
    /// `GATEWAY_URL`, `RECONNECT_DELAY_MS`, `APPLICATION_ID`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `DISCORD_TOKEN` or `DISCORD_INTENTS`
    /// is missing or unparseable.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let token = std::env::var("DISCORD_TOKEN")
            .map_err(|_| Error::Config("DISCORD_TOKEN is required".to_string()))?;

        let intents: u64 = std::env::var("DISCORD_INTENTS")
            .map_err(|_| Error::Config("DISCORD_INTENTS is required".to_string()))?
            .parse()
            .map_err(|_| Error::Config("DISCORD_INTENTS must be an integer".to_string()))?;

        let gateway_url =
            std::env::var("GATEWAY_URL").unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string());

        let reconnect_delay = Duration::from_millis(parse_env(
            "RECONNECT_DELAY_MS",
            DEFAULT_RECONNECT_DELAY.as_millis() as u64,
        ));

        let application_id = std::env::var("APPLICATION_ID").ok();

        let config = Self {
            token,
            intents,
            gateway_url,
            reconnect_delay,
            application_id,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the token is empty.
    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(Error::Config("token is required".to_string()));
        }
        Ok(())
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
