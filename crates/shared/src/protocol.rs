//! Envelope format for the room's ephemeral data channel.
//!
//! Every envelope is a single UTF-8 JSON object carrying a `type` tag, a
//! protocol version under `v`, and the variant payload inline:
//!
//! ```json
//! {"v":1,"type":"role_update","identity":"alice","role":"speaker"}
//! ```
//!
//! Peers that predate the version field send no `v`; those envelopes are read
//! as version 1. Unknown tags decode to [`EnvelopeBody::Unknown`] so newer
//! message types never break older receivers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{ChatMessage, ParticipantRole, Reaction, RoomMetadata};

pub const PROTOCOL_VERSION: u64 = 1;
const VERSION_FIELD: &str = "v";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnvelopeBody {
    RoomMetadata {
        data: RoomMetadata,
    },
    ChatMessage {
        data: ChatMessage,
    },
    Reaction {
        data: Reaction,
    },
    HandRaised {
        identity: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    RoleUpdate {
        identity: String,
        role: ParticipantRole,
    },
    MuteRequest {
        identity: String,
    },
    #[serde(other)]
    Unknown,
}

impl EnvelopeBody {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RoomMetadata { .. } => "room_metadata",
            Self::ChatMessage { .. } => "chat_message",
            Self::Reaction { .. } => "reaction",
            Self::HandRaised { .. } => "hand_raised",
            Self::RoleUpdate { .. } => "role_update",
            Self::MuteRequest { .. } => "mute_request",
            Self::Unknown => "unknown",
        }
    }

    /// Role updates, mute requests and metadata announcements are reserved for
    /// hosts and co-hosts.
    pub fn is_privileged(&self) -> bool {
        matches!(
            self,
            Self::RoomMetadata { .. } | Self::RoleUpdate { .. } | Self::MuteRequest { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub version: u64,
    pub body: EnvelopeBody,
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("envelope is not valid utf-8")]
    InvalidUtf8,
    #[error("envelope is not a json object: {0}")]
    InvalidJson(String),
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u64),
    #[error("unknown envelope type")]
    UnknownType,
    #[error("failed to encode envelope: {0}")]
    Encode(String),
}

impl Envelope {
    pub fn new(body: EnvelopeBody) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            body,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        let mut value =
            serde_json::to_value(&self.body).map_err(|e| EnvelopeError::Encode(e.to_string()))?;
        let Value::Object(fields) = &mut value else {
            return Err(EnvelopeError::Encode("envelope body is not an object".into()));
        };
        fields.insert(VERSION_FIELD.to_string(), Value::from(self.version));
        serde_json::to_vec(&value).map_err(|e| EnvelopeError::Encode(e.to_string()))
    }

    pub fn decode(payload: &[u8]) -> Result<Self, EnvelopeError> {
        let text = std::str::from_utf8(payload).map_err(|_| EnvelopeError::InvalidUtf8)?;
        let value: Value =
            serde_json::from_str(text).map_err(|e| EnvelopeError::InvalidJson(e.to_string()))?;
        if !value.is_object() {
            return Err(EnvelopeError::InvalidJson("expected an object".into()));
        }

        let version = match value.get(VERSION_FIELD) {
            None => PROTOCOL_VERSION,
            Some(raw) => raw
                .as_u64()
                .ok_or_else(|| EnvelopeError::InvalidJson("version must be an integer".into()))?,
        };
        if version != PROTOCOL_VERSION {
            return Err(EnvelopeError::UnsupportedVersion(version));
        }

        let body: EnvelopeBody =
            serde_json::from_value(value).map_err(|e| EnvelopeError::InvalidJson(e.to_string()))?;
        if body == EnvelopeBody::Unknown {
            return Err(EnvelopeError::UnknownType);
        }

        Ok(Self { version, body })
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
