//! One-shot REST calls against the HTTP API.
//!
//! The gateway never uses these; they are the synchronous collaborators a
//! bot needs around it: sending messages, registering command schemas,
//! answering interactions, and managing channels and members.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Default REST endpoint (API v10).
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Ephemeral message flag on interaction responses.
const EPHEMERAL_FLAG: u64 = 64;

/// Authenticated HTTP client for the bot REST API.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl RestClient {
    /// Creates a client authenticating as `Bot <token>`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, DEFAULT_API_BASE)
    }

    /// Creates a client against a non-default API base (testing, proxies).
    #[must_use]
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
            base_url: base_url.into(),
        }
    }

    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method, &url)
            .header("Authorization", format!("Bot {}", self.token));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Posts a message to a channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on transport failure or [`Error::Api`] when
    /// the API rejects the request.
    pub async fn create_message(&self, channel_id: &str, message: &CreateMessage) -> Result<Value> {
        let body = serde_json::to_value(message)?;
        self.request(
            Method::POST,
            &format!("/channels/{channel_id}/messages"),
            Some(&body),
        )
        .await
    }

    /// Registers a global application command schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on transport failure or [`Error::Api`] when
    /// the API rejects the schema.
    pub async fn register_command(
        &self,
        application_id: &str,
        command: &CommandSchema,
    ) -> Result<Value> {
        let body = serde_json::to_value(command)?;
        self.request(
            Method::POST,
            &format!("/applications/{application_id}/commands"),
            Some(&body),
        )
        .await
    }

    /// Registers an application command schema scoped to one guild.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on transport failure or [`Error::Api`] when
    /// the API rejects the schema.
    pub async fn register_guild_command(
        &self,
        application_id: &str,
        guild_id: &str,
        command: &CommandSchema,
    ) -> Result<Value> {
        let body = serde_json::to_value(command)?;
        self.request(
            Method::POST,
            &format!("/applications/{application_id}/guilds/{guild_id}/commands"),
            Some(&body),
        )
        .await
    }

    /// Answers an interaction callback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on transport failure or [`Error::Api`] when
    /// the API rejects the response.
    pub async fn respond_to_interaction(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        response: &InteractionResponse,
    ) -> Result<()> {
        let body = serde_json::to_value(response)?;
        self.request(
            Method::POST,
            &format!("/interactions/{interaction_id}/{interaction_token}/callback"),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    /// Creates a guild channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on transport failure or [`Error::Api`] when
    /// the API rejects the request.
    pub async fn create_channel(&self, guild_id: &str, channel: &CreateChannel) -> Result<Value> {
        let body = serde_json::to_value(channel)?;
        self.request(
            Method::POST,
            &format!("/guilds/{guild_id}/channels"),
            Some(&body),
        )
        .await
    }

    /// Deletes a channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on transport failure or [`Error::Api`] when
    /// the API rejects the request.
    pub async fn delete_channel(&self, channel_id: &str) -> Result<()> {
        self.request(Method::DELETE, &format!("/channels/{channel_id}"), None)
            .await?;
        Ok(())
    }

    /// Patches a guild member (nickname, roles, mute, timeout).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on transport failure or [`Error::Api`] when
    /// the API rejects the request.
    pub async fn modify_member(
        &self,
        guild_id: &str,
        user_id: &str,
        patch: &Value,
    ) -> Result<Value> {
        self.request(
            Method::PATCH,
            &format!("/guilds/{guild_id}/members/{user_id}"),
            Some(patch),
        )
        .await
    }
}

/// Outbound message payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateMessage {
    /// Plain text content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Pre-built embed objects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeds: Option<Vec<Value>>,
    /// Reference to the message being replied to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_reference: Option<Value>,
}

impl CreateMessage {
    /// Plain text message.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Marks the message as a reply to another message.
    #[must_use]
    pub fn in_reply_to(mut self, message_id: &str) -> Self {
        self.message_reference = Some(serde_json::json!({ "message_id": message_id }));
        self
    }
}

/// Application command schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSchema {
    /// Command name.
    pub name: String,
    /// Command description.
    pub description: String,
    /// Option definitions, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl CommandSchema {
    /// Schema with a name and description and no options.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            options: None,
        }
    }
}

/// Interaction callback payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionResponse {
    /// Callback type (4 = message, 5 = deferred message).
    #[serde(rename = "type")]
    pub kind: u8,
    /// Callback data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl InteractionResponse {
    /// Immediate channel-message response.
    #[must_use]
    pub fn message(content: impl Into<String>, ephemeral: bool) -> Self {
        let mut data = serde_json::json!({ "content": content.into() });
        if ephemeral
            && let Some(map) = data.as_object_mut()
        {
            map.insert("flags".to_string(), Value::from(EPHEMERAL_FLAG));
        }
        Self {
            kind: 4,
            data: Some(data),
        }
    }

    /// Deferred response; the reply is edited in later.
    #[must_use]
    pub fn deferred(ephemeral: bool) -> Self {
        let data = if ephemeral {
            serde_json::json!({ "flags": EPHEMERAL_FLAG })
        } else {
            serde_json::json!({})
        };
        Self {
            kind: 5,
            data: Some(data),
        }
    }
}

/// Guild channel creation payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChannel {
    /// Channel name.
    pub name: String,
    /// Channel type (0 = text).
    #[serde(rename = "type")]
    pub kind: u8,
    /// Channel topic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Parent category ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl CreateChannel {
    /// Text channel with the given name.
    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: 0,
            topic: None,
            parent_id: None,
        }
    }
}
