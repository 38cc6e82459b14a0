use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use shared::{
    api::{CreateRoomRequest, CreateRoomResponse, RoomRecord, TokenRequest, TokenResponse},
    domain::DEFAULT_MAX_SPEAKERS,
    error::{ApiError, ErrorCode},
};
use storage::Storage;
use tracing::{info, warn};
use uuid::Uuid;

use crate::livekit::{mint_token, LiveKitConfig};

const MAX_ROOM_NAME_BYTES: usize = 120;
const MAX_TOPICS: usize = 10;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub livekit: LiveKitConfig,
    pub livekit_url: Option<String>,
}

pub async fn issue_token(ctx: &ApiContext, req: TokenRequest) -> Result<TokenResponse, ApiError> {
    let room_name = req.room_name.trim();
    if room_name.is_empty() {
        return Err(ApiError::validation("roomName is required"));
    }

    let Some(url) = ctx.livekit_url.clone() else {
        warn!(room = %room_name, "token requested but LiveKit server not configured");
        return Err(ApiError::new(
            ErrorCode::NotConfigured,
            "LiveKit server not configured",
        ));
    };

    let identity = non_blank(req.participant_identity)
        .unwrap_or_else(|| format!("guest-{}", Uuid::new_v4().simple()));
    let display_name = non_blank(req.participant_name).unwrap_or_else(|| identity.clone());

    let token =
        mint_token(&ctx.livekit, &identity, &display_name, room_name).map_err(ApiError::internal)?;
    info!(room = %room_name, %identity, "issued session credential");

    Ok(TokenResponse { token, url })
}

pub async fn create_room(
    ctx: &ApiContext,
    mut req: CreateRoomRequest,
) -> Result<CreateRoomResponse, ApiError> {
    req.name = req.name.trim().to_string();
    if req.name.is_empty() {
        return Err(ApiError::validation("room name is required"));
    }
    if req.name.len() > MAX_ROOM_NAME_BYTES {
        return Err(ApiError::validation("room name is too long"));
    }
    if req.host_id.trim().is_empty() {
        return Err(ApiError::validation("hostId is required"));
    }
    if req.max_speakers == 0 || req.max_speakers > DEFAULT_MAX_SPEAKERS {
        return Err(ApiError::validation(format!(
            "maxSpeakers must be between 1 and {DEFAULT_MAX_SPEAKERS}"
        )));
    }
    req.topics = req
        .topics
        .into_iter()
        .map(|topic| topic.trim().to_string())
        .filter(|topic| !topic.is_empty())
        .take(MAX_TOPICS)
        .collect();

    let room_id = format!("room-{}", Uuid::new_v4().simple());
    let invite_token = URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes());

    let record = ctx
        .storage
        .create_room(&room_id, &invite_token, &req, Utc::now())
        .await
        .map_err(ApiError::internal)?;
    info!(room_id = %record.room_id, host = %record.host_id, "room created");

    Ok(CreateRoomResponse {
        room_id: record.room_id,
        invite_token: record.invite_token,
    })
}

pub async fn get_room(ctx: &ApiContext, room_id: &str) -> Result<RoomRecord, ApiError> {
    ctx.storage
        .get_room(room_id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("room not found"))
}

pub async fn get_room_by_invite(
    ctx: &ApiContext,
    invite_token: &str,
) -> Result<RoomRecord, ApiError> {
    ctx.storage
        .get_room_by_invite(invite_token)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("invite not found"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
