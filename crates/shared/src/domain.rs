use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default speaker cap: one host, up to two co-hosts and ten speakers.
pub const DEFAULT_MAX_SPEAKERS: u32 = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParticipantRole {
    Host,
    CoHost,
    Speaker,
    #[default]
    Listener,
}

impl ParticipantRole {
    /// Host and co-host may emit privileged room messages.
    pub fn is_moderator(self) -> bool {
        matches!(self, Self::Host | Self::CoHost)
    }

    /// Every role except listener publishes a microphone track.
    pub fn can_publish_audio(self) -> bool {
        !matches!(self, Self::Listener)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::CoHost => "co-host",
            Self::Speaker => "speaker",
            Self::Listener => "listener",
        }
    }
}

impl std::fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub identity: String,
    pub name: String,
    pub role: ParticipantRole,
    pub is_muted: bool,
    pub is_speaking: bool,
    pub audio_level: f32,
    pub has_raised_hand: bool,
    pub joined_at: DateTime<Utc>,
}

/// Out-of-band state each peer attaches to its own session participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantMetadata {
    #[serde(default)]
    pub role: ParticipantRole,
    #[serde(default)]
    pub has_raised_hand: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default = "default_max_speakers")]
    pub max_speakers: u32,
    pub host_identity: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub scheduled_for: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

fn default_max_speakers() -> u32 {
    DEFAULT_MAX_SPEAKERS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMessageKind {
    #[default]
    Text,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    #[serde(rename = "participantIdentity")]
    pub sender_identity: String,
    #[serde(rename = "participantName")]
    pub sender_name: String,
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type", default)]
    pub kind: ChatMessageKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    #[serde(rename = "participantIdentity")]
    pub sender_identity: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}
