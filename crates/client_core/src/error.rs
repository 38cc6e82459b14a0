use thiserror::Error;

use crate::credentials::CredentialError;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("failed to connect livekit room: {0}")]
    Transport(String),
    #[error("failed to publish microphone: {0}")]
    Publish(String),
    #[error("connect was cancelled by a disconnect")]
    Cancelled,
    #[error("already connected or connecting; disconnect first")]
    AlreadyActive,
}

pub const UNREACHABLE_MESSAGE: &str =
    "Cannot reach the media server. Check that it is running and the URL is correct.";
pub const MISCONFIGURED_MESSAGE: &str =
    "Media credentials are not configured. Set LIVEKIT_API_KEY and LIVEKIT_API_SECRET on the server.";
pub const CROSS_ORIGIN_MESSAGE: &str =
    "The media server rejected the request origin. Check its CORS configuration.";

/// Maps a connect failure onto a message a user can act on.
pub fn describe_connect_error(err: &ConnectError) -> String {
    match err {
        ConnectError::Credential(CredentialError::Unreachable(_)) => UNREACHABLE_MESSAGE.into(),
        ConnectError::Credential(CredentialError::Status { .. }) => MISCONFIGURED_MESSAGE.into(),
        other => describe_connect_failure(&other.to_string()),
    }
}

/// Same classification for a failure that only survived as text.
pub fn describe_connect_failure(message: &str) -> String {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("could not establish signal connection")
        || lowered.contains("failed to fetch")
    {
        UNREACHABLE_MESSAGE.into()
    } else if lowered.contains("token generation failed") || lowered.contains("not configured") {
        MISCONFIGURED_MESSAGE.into()
    } else if message.contains("CORS") {
        CROSS_ORIGIN_MESSAGE.into()
    } else {
        format!("Connection failed: {message}")
    }
}
