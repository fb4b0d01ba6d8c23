//! Top-level bot client wiring configuration, gateway, dispatcher, and
//! REST together.

use std::sync::Arc;

use serde_json::Value;

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::events::EventDispatcher;
use crate::gateway::{ConnectionState, Gateway, SessionInfo};
use crate::presence::PresenceUpdate;
use crate::rest::RestClient;

/// A bot client: one gateway connection plus the REST collaborator.
///
/// Register event listeners with [`Client::on`], then call
/// [`Client::start`] (it runs until [`Client::disconnect`]).
#[derive(Debug, Clone)]
pub struct Client {
    dispatcher: EventDispatcher,
    gateway: Arc<Gateway>,
    rest: RestClient,
}

impl Client {
    /// Builds a client from a validated configuration.
    ///
    /// Must be called within a tokio runtime (the event dispatcher spawns
    /// its fan-out worker immediately).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the configuration is invalid.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let dispatcher = EventDispatcher::new();
        let rest = RestClient::new(config.token.clone());
        let gateway = Gateway::new(config, dispatcher.clone())?;
        Ok(Self {
            dispatcher,
            gateway: Arc::new(gateway),
            rest,
        })
    }

    /// Registers a callback for a named gateway event.
    pub fn on(&self, event: impl Into<String>, callback: impl Fn(&Value) + Send + Sync + 'static) {
        self.dispatcher.on(event, callback);
    }

    /// Connects and keeps the gateway connected until disconnect.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the configuration is invalid;
    /// transport failures are recovered internally and never surface here.
    pub async fn start(&self) -> Result<()> {
        self.gateway.run().await
    }

    /// The gateway connection manager.
    #[must_use]
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// The REST collaborator.
    #[must_use]
    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    /// Enqueues a presence update on the current connection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotConnected`] when no transport is open.
    pub fn update_presence(&self, update: &PresenceUpdate) -> Result<()> {
        self.gateway.update_presence(update)
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.gateway.state()
    }

    /// Copy of the current session identity.
    #[must_use]
    pub fn session(&self) -> SessionInfo {
        self.gateway.session()
    }

    /// Requests a terminal disconnect; [`Client::start`] then returns.
    pub fn disconnect(&self) {
        self.gateway.disconnect();
    }
}
