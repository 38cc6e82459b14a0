use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use reqwest::{Client, StatusCode};
use shared::api::{CreateRoomRequest, CreateRoomResponse, RoomRecord, INVITES_ROUTE, ROOMS_ROUTE};
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

const ROOM_PATH_MARKER: &str = "/clubspaces/room/";
const INVITE_PATH_MARKER: &str = "/clubspaces/invite/";

#[async_trait]
pub trait RoomDirectory: Send + Sync {
    async fn create_room(&self, request: &CreateRoomRequest) -> Result<CreateRoomResponse>;
    async fn get_room(&self, room_id: &str) -> Result<Option<RoomRecord>>;
    async fn get_room_by_invite(&self, invite_token: &str) -> Result<Option<RoomRecord>>;
}

pub struct MissingRoomDirectory;

#[async_trait]
impl RoomDirectory for MissingRoomDirectory {
    async fn create_room(&self, _request: &CreateRoomRequest) -> Result<CreateRoomResponse> {
        Err(anyhow!("room directory is unavailable"))
    }

    async fn get_room(&self, _room_id: &str) -> Result<Option<RoomRecord>> {
        Err(anyhow!("room directory is unavailable"))
    }

    async fn get_room_by_invite(&self, _invite_token: &str) -> Result<Option<RoomRecord>> {
        Err(anyhow!("room directory is unavailable"))
    }
}

pub struct HttpRoomDirectory {
    http: Client,
    base_url: Url,
}

impl HttpRoomDirectory {
    pub fn new(server_url: &str) -> Result<Self> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(server_url).context("invalid room directory url")?,
        })
    }

    async fn fetch_record(&self, path: &str) -> Result<Option<RoomRecord>> {
        let url = self.base_url.join(path)?;
        let response = self.http.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let record = response.error_for_status()?.json().await?;
        Ok(Some(record))
    }
}

#[async_trait]
impl RoomDirectory for HttpRoomDirectory {
    async fn create_room(&self, request: &CreateRoomRequest) -> Result<CreateRoomResponse> {
        let url = self.base_url.join(ROOMS_ROUTE)?;
        let created = self
            .http
            .post(url)
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(created)
    }

    async fn get_room(&self, room_id: &str) -> Result<Option<RoomRecord>> {
        self.fetch_record(&format!("{ROOMS_ROUTE}/{room_id}")).await
    }

    async fn get_room_by_invite(&self, invite_token: &str) -> Result<Option<RoomRecord>> {
        self.fetch_record(&format!("{INVITES_ROUTE}/{invite_token}"))
            .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRoom {
    pub room_id: String,
    pub invite_token: String,
    /// True when the directory was unreachable and the ids were minted locally.
    pub ad_hoc: bool,
}

/// Registers a room, or mints a local ad-hoc id and invite token when the
/// directory cannot be reached. Creating a room never fails outright.
pub async fn create_room_or_fallback(
    directory: &dyn RoomDirectory,
    request: &CreateRoomRequest,
) -> CreatedRoom {
    match directory.create_room(request).await {
        Ok(created) => {
            info!("directory: room registered room_id={}", created.room_id);
            CreatedRoom {
                room_id: created.room_id,
                invite_token: created.invite_token,
                ad_hoc: false,
            }
        }
        Err(err) => {
            warn!("directory: unavailable, using ad-hoc room id err={err}");
            mint_ad_hoc_room()
        }
    }
}

pub fn mint_ad_hoc_room() -> CreatedRoom {
    let suffix = Uuid::new_v4().simple().to_string();
    CreatedRoom {
        room_id: format!(
            "room-{}-{}",
            Utc::now().timestamp_millis(),
            &suffix[..9]
        ),
        invite_token: URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes()),
        ad_hoc: true,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomReference {
    RoomId(String),
    InviteToken(String),
}

/// Reads a room id out of a pasted link. Room links yield the id, invite links
/// yield the token; anything else is taken as a room id verbatim.
pub fn parse_room_reference(input: &str) -> RoomReference {
    let input = input.trim();
    let path_segment = |marker: &str| {
        input.split_once(marker).map(|(_, rest)| {
            rest.split(['/', '?', '#'])
                .next()
                .unwrap_or_default()
                .to_string()
        })
    };

    if let Some(room_id) = path_segment(ROOM_PATH_MARKER).filter(|id| !id.is_empty()) {
        return RoomReference::RoomId(room_id);
    }
    if let Some(token) = path_segment(INVITE_PATH_MARKER).filter(|t| !t.is_empty()) {
        return RoomReference::InviteToken(token);
    }
    RoomReference::RoomId(input.to_string())
}

/// Turns a reference into a room id. Invite tokens are looked up in the
/// directory; if that fails the token itself is used as the room name.
pub async fn resolve_room_reference(
    directory: &dyn RoomDirectory,
    reference: RoomReference,
) -> String {
    match reference {
        RoomReference::RoomId(room_id) => room_id,
        RoomReference::InviteToken(token) => match directory.get_room_by_invite(&token).await {
            Ok(Some(record)) => record.room_id,
            Ok(None) => {
                warn!("directory: invite not found, joining by token token={token}");
                token
            }
            Err(err) => {
                warn!("directory: invite lookup failed, joining by token err={err}");
                token
            }
        },
    }
}

#[cfg(test)]
#[path = "tests/directory_tests.rs"]
mod tests;
