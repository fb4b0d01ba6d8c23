//! Presence/status update payloads (op 3).

use serde::{Deserialize, Serialize};

/// Presence update sent through the gateway send queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceUpdate {
    /// Unix time (ms) the client went idle, if it is.
    pub since: Option<u64>,
    /// Activities the bot is engaged in.
    pub activities: Vec<Activity>,
    /// Online status string.
    pub status: Status,
    /// Whether the client is AFK.
    pub afk: bool,
}

impl PresenceUpdate {
    /// Presence with a single "playing" activity and online status.
    #[must_use]
    pub fn playing(name: impl Into<String>) -> Self {
        Self {
            since: None,
            activities: vec![Activity {
                name: name.into(),
                kind: ActivityKind::Playing,
            }],
            status: Status::Online,
            afk: false,
        }
    }

    /// Replaces the status, keeping the activities.
    #[must_use]
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }
}

/// A single activity entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    /// Activity name shown in the member list.
    pub name: String,
    /// Activity type.
    #[serde(rename = "type")]
    pub kind: ActivityKind,
}

/// Activity type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ActivityKind {
    /// "Playing {name}".
    Playing,
    /// "Streaming {name}".
    Streaming,
    /// "Listening to {name}".
    Listening,
    /// "Watching {name}".
    Watching,
    /// "Competing in {name}".
    Competing,
}

impl From<ActivityKind> for u8 {
    fn from(kind: ActivityKind) -> Self {
        match kind {
            ActivityKind::Playing => 0,
            ActivityKind::Streaming => 1,
            ActivityKind::Listening => 2,
            ActivityKind::Watching => 3,
            ActivityKind::Competing => 5,
        }
    }
}

impl TryFrom<u8> for ActivityKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            0 => Ok(Self::Playing),
            1 => Ok(Self::Streaming),
            2 => Ok(Self::Listening),
            3 => Ok(Self::Watching),
            5 => Ok(Self::Competing),
            other => Err(format!("unknown activity type: {other}")),
        }
    }
}

/// Online status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Shown as online.
    Online,
    /// Do not disturb.
    Dnd,
    /// Shown as idle.
    Idle,
    /// Online but shown as offline.
    Invisible,
    /// Shown as offline.
    Offline,
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn presence_serializes_to_the_wire_shape() {
        let presence = PresenceUpdate::playing("SynCord").with_status(Status::Dnd);
        let Ok(value) = serde_json::to_value(&presence) else {
            panic!("presence should serialize");
        };
        assert_eq!(value["status"], "dnd");
        assert_eq!(value["afk"], false);
        assert_eq!(value["activities"][0]["name"], "SynCord");
        assert_eq!(value["activities"][0]["type"], 0);
    }
}
