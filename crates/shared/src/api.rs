use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::DEFAULT_MAX_SPEAKERS;

pub const TOKEN_ROUTE: &str = "/api/livekit/token";
pub const ROOMS_ROUTE: &str = "/api/rooms";
pub const INVITES_ROUTE: &str = "/api/invites";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub room_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_identity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default = "default_public")]
    pub is_public: bool,
    pub host_id: String,
    pub host_name: String,
    #[serde(default = "default_max_speakers")]
    pub max_speakers: u32,
}

fn default_public() -> bool {
    true
}

fn default_max_speakers() -> u32 {
    DEFAULT_MAX_SPEAKERS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: String,
    pub invite_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    pub room_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub is_public: bool,
    pub host_id: String,
    pub host_name: String,
    pub max_speakers: u32,
    pub invite_token: String,
    pub created_at: DateTime<Utc>,
}
