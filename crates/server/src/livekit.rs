use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct LiveKitConfig {
    pub api_key: String,
    pub api_secret: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoGrant {
    room_join: bool,
    room: String,
    can_publish: bool,
    can_subscribe: bool,
    can_publish_data: bool,
}

#[derive(Debug, Serialize)]
struct Claims {
    iss: String,
    sub: String,
    name: String,
    nbf: i64,
    iat: i64,
    exp: i64,
    video: VideoGrant,
}

/// Mints a session credential for `identity` in `room_name`.
///
/// Publish rights are granted to everyone: speaking roles are assigned
/// client-side, so the grant cannot know who will be promoted later.
pub fn mint_token(
    cfg: &LiveKitConfig,
    identity: &str,
    display_name: &str,
    room_name: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::seconds(cfg.ttl_seconds);
    let claims = Claims {
        iss: cfg.api_key.clone(),
        sub: identity.to_string(),
        name: display_name.to_string(),
        nbf: now.timestamp(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
        video: VideoGrant {
            room_join: true,
            room: room_name.to_string(),
            can_publish: true,
            can_subscribe: true,
            can_publish_data: true,
        },
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.api_secret.as_bytes()),
    )
}

#[cfg(test)]
#[path = "tests/livekit_tests.rs"]
mod tests;
