//! Example bot entry point.
//!
//! Connects the gateway, sets a presence when the session is ready, and
//! answers `!ping` in any channel the bot can see.

use serde_json::Value;
use tracing_subscriber::EnvFilter;

use syncord::presence::PresenceUpdate;
use syncord::rest::CreateMessage;
use syncord::{Client, GatewayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = GatewayConfig::from_env()?;
    tracing::info!(url = %config.gateway_url, "starting syncord bot");

    let client = Client::new(config)?;

    let gateway = std::sync::Arc::clone(client.gateway());
    client.on("READY", move |data| {
        let username = data
            .pointer("/user/username")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        tracing::info!(%username, "logged in");
        if let Err(e) = gateway.update_presence(&PresenceUpdate::playing("SynCord")) {
            tracing::warn!(error = %e, "failed to set presence");
        }
    });

    let rest = client.rest().clone();
    client.on("MESSAGE_CREATE", move |message| {
        if message
            .pointer("/author/bot")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            return;
        }
        let Some(content) = message.get("content").and_then(Value::as_str) else {
            return;
        };
        if content != "!ping" {
            return;
        }
        let Some(channel_id) = message.get("channel_id").and_then(Value::as_str) else {
            return;
        };

        let rest = rest.clone();
        let channel_id = channel_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = rest
                .create_message(&channel_id, &CreateMessage::text("Pong!"))
                .await
            {
                tracing::warn!(error = %e, "failed to send pong");
            }
        });
    });

    client.start().await?;
    Ok(())
}
