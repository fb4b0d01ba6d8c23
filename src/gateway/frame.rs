//! Gateway wire format: opcodes, the `{op, d, s, t}` envelope, and typed
//! control payloads.
//!
//! Opcodes are a closed enum rather than raw integers so that every
//! inbound opcode is handled exhaustively; a frame carrying an opcode
//! outside the table fails to decode and is dropped by the read loop.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::error::Error;

/// Library identifier reported in the Identify connection properties.
const LIBRARY_NAME: &str = "syncord";

/// Gateway protocol opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Opcode {
    /// Inbound application event with a sequence number and event name.
    Dispatch,
    /// Outbound liveness ping carrying the last seen sequence number.
    Heartbeat,
    /// Outbound new-session handshake.
    Identify,
    /// Outbound presence/status update.
    PresenceUpdate,
    /// Outbound session resumption.
    Resume,
    /// Inbound request to close and reconnect (session stays resumable).
    Reconnect,
    /// Inbound session invalidation; payload is a resumability flag.
    InvalidSession,
    /// Inbound greeting announcing the heartbeat interval.
    Hello,
    /// Inbound acknowledgment of the last heartbeat.
    HeartbeatAck,
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self {
        match op {
            Opcode::Dispatch => 0,
            Opcode::Heartbeat => 1,
            Opcode::Identify => 2,
            Opcode::PresenceUpdate => 3,
            Opcode::Resume => 6,
            Opcode::Reconnect => 7,
            Opcode::InvalidSession => 9,
            Opcode::Hello => 10,
            Opcode::HeartbeatAck => 11,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::Dispatch),
            1 => Ok(Self::Heartbeat),
            2 => Ok(Self::Identify),
            3 => Ok(Self::PresenceUpdate),
            6 => Ok(Self::Resume),
            7 => Ok(Self::Reconnect),
            9 => Ok(Self::InvalidSession),
            10 => Ok(Self::Hello),
            11 => Ok(Self::HeartbeatAck),
            other => Err(Error::UnknownOpcode(other)),
        }
    }
}

/// Top-level gateway frame envelope.
///
/// Every frame on the wire, inbound or outbound, has this shape. `s` and
/// `t` are only populated on Dispatch frames; outbound frames omit them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayFrame {
    /// Frame opcode.
    pub op: Opcode,
    /// Opcode-specific payload.
    #[serde(default)]
    pub d: Value,
    /// Sequence number (Dispatch frames only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    /// Event name (Dispatch frames only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayFrame {
    /// Builds an outbound frame from an opcode and payload.
    #[must_use]
    pub fn outbound(op: Opcode, d: Value) -> Self {
        Self {
            op,
            d,
            s: None,
            t: None,
        }
    }

    /// Builds a Heartbeat frame carrying the last seen sequence number.
    #[must_use]
    pub fn heartbeat(sequence: Option<u64>) -> Self {
        let d = sequence.map_or(Value::Null, Value::from);
        Self::outbound(Opcode::Heartbeat, d)
    }

    /// Builds an Identify frame from the client configuration.
    #[must_use]
    pub fn identify(config: &GatewayConfig) -> Self {
        let payload = Identify {
            token: config.token.clone(),
            intents: config.intents,
            properties: ConnectionProperties::default(),
        };
        // Identify is a plain struct of strings and integers; serialization
        // cannot fail.
        let d = serde_json::to_value(payload).unwrap_or(Value::Null);
        Self::outbound(Opcode::Identify, d)
    }

    /// Builds a Resume frame reattaching to a previous session.
    #[must_use]
    pub fn resume(token: &str, session_id: &str, sequence: Option<u64>) -> Self {
        let payload = Resume {
            token: token.to_string(),
            session_id: session_id.to_string(),
            seq: sequence,
        };
        let d = serde_json::to_value(payload).unwrap_or(Value::Null);
        Self::outbound(Opcode::Resume, d)
    }
}

/// Identify payload establishing a brand-new session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identify {
    /// Bot authentication token.
    pub token: String,
    /// Gateway intents bitfield.
    pub intents: u64,
    /// Client identification properties.
    pub properties: ConnectionProperties,
}

/// Connection properties reported during Identify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProperties {
    /// Operating system of the host process.
    pub os: String,
    /// Library name.
    pub browser: String,
    /// Device name.
    pub device: String,
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: LIBRARY_NAME.to_string(),
            device: LIBRARY_NAME.to_string(),
        }
    }
}

/// Resume payload reattaching to a previous session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resume {
    /// Bot authentication token.
    pub token: String,
    /// Session identifier issued by the readiness event.
    pub session_id: String,
    /// Last sequence number seen before the disconnect.
    pub seq: Option<u64>,
}

/// Hello payload announcing the heartbeat cadence.
#[derive(Debug, Clone, Deserialize)]
pub struct Hello {
    /// Milliseconds between heartbeats.
    pub heartbeat_interval: u64,
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn opcode_roundtrips_through_u8() {
        for op in [
            Opcode::Dispatch,
            Opcode::Heartbeat,
            Opcode::Identify,
            Opcode::PresenceUpdate,
            Opcode::Resume,
            Opcode::Reconnect,
            Opcode::InvalidSession,
            Opcode::Hello,
            Opcode::HeartbeatAck,
        ] {
            let raw: u8 = op.into();
            assert_eq!(Opcode::try_from(raw).ok(), Some(op));
        }
    }

    #[test]
    fn unknown_opcode_fails_to_decode() {
        assert!(Opcode::try_from(4).is_err());
        let result = serde_json::from_str::<GatewayFrame>(r#"{"op":42,"d":null}"#);
        assert!(result.is_err());
    }

    #[test]
    fn hello_frame_decodes() {
        let json = r#"{"op":10,"d":{"heartbeat_interval":41250},"s":null,"t":null}"#;
        let Ok(frame) = serde_json::from_str::<GatewayFrame>(json) else {
            panic!("expected hello to decode");
        };
        assert_eq!(frame.op, Opcode::Hello);
        assert_eq!(frame.s, None);
        assert_eq!(frame.t, None);
        let Ok(hello) = serde_json::from_value::<Hello>(frame.d) else {
            panic!("expected hello payload");
        };
        assert_eq!(hello.heartbeat_interval, 41_250);
    }

    #[test]
    fn dispatch_frame_decodes_with_sequence_and_name() {
        let json = r#"{"op":0,"d":{"session_id":"abc"},"s":7,"t":"READY"}"#;
        let Ok(frame) = serde_json::from_str::<GatewayFrame>(json) else {
            panic!("expected dispatch to decode");
        };
        assert_eq!(frame.op, Opcode::Dispatch);
        assert_eq!(frame.s, Some(7));
        assert_eq!(frame.t.as_deref(), Some("READY"));
    }

    #[test]
    fn identify_carries_token_intents_and_properties() {
        let Ok(config) = crate::config::GatewayConfig::new("tok", 513) else {
            panic!("config");
        };
        let frame = GatewayFrame::identify(&config);
        assert_eq!(frame.op, Opcode::Identify);
        assert_eq!(frame.d["token"], "tok");
        assert_eq!(frame.d["intents"], 513);
        assert_eq!(frame.d["properties"]["browser"], LIBRARY_NAME);
        assert_eq!(frame.d["properties"]["os"], std::env::consts::OS);
    }

    #[test]
    fn resume_carries_session_and_sequence() {
        let frame = GatewayFrame::resume("tok", "abc", Some(42));
        assert_eq!(frame.op, Opcode::Resume);
        assert_eq!(frame.d["session_id"], "abc");
        assert_eq!(frame.d["seq"], 42);
    }

    #[test]
    fn outbound_frames_omit_null_sequence_and_name() {
        let Ok(json) = serde_json::to_string(&GatewayFrame::heartbeat(Some(3))) else {
            panic!("heartbeat should serialize");
        };
        assert_eq!(json, r#"{"op":1,"d":3}"#);
    }
}
