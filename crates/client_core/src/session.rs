use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{anyhow, Context, Result};
use livekit_integration::{
    AudioCaptureOptions, DataReliability, LiveKitRoomConnector, LiveKitRoomEvent,
    LiveKitRoomOptions, LiveKitRoomSession, SessionParticipant,
};
use shared::api::TokenRequest;
use shared::domain::{ParticipantMetadata, ParticipantRole};
use shared::protocol::Envelope;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::credentials::CredentialFetcher;
use crate::error::ConnectError;
use crate::presence::encode_participant_metadata;

/// Owns one connected transport session on behalf of the coordinator.
pub struct SessionManager {
    room: Arc<dyn LiveKitRoomSession>,
    closed: AtomicBool,
}

/// A session that finished the connect pipeline, with its event feed already
/// subscribed so nothing sent after connect is missed.
pub struct EstablishedSession {
    pub session: SessionManager,
    pub events: broadcast::Receiver<LiveKitRoomEvent>,
}

/// Credential fetch, transport connect, then local metadata and microphone.
pub async fn establish_session(
    fetcher: Arc<dyn CredentialFetcher>,
    connector: Arc<dyn LiveKitRoomConnector>,
    request: TokenRequest,
    role: ParticipantRole,
) -> Result<EstablishedSession, ConnectError> {
    let credential = fetcher.fetch_credential(&request).await?;
    let room = connector
        .connect(LiveKitRoomOptions {
            url: credential.url,
            token: credential.token,
        })
        .await
        .map_err(|err| ConnectError::Transport(err.to_string()))?;

    let events = room.subscribe_events();
    let session = SessionManager::new(room);
    if let Err(err) = session.attach(role).await {
        session.close().await;
        return Err(err);
    }

    info!(
        "session: connected room={} identity={} role={role}",
        request.room_name,
        session.local_identity()
    );
    Ok(EstablishedSession { session, events })
}

impl SessionManager {
    pub fn new(room: Arc<dyn LiveKitRoomSession>) -> Self {
        Self {
            room,
            closed: AtomicBool::new(false),
        }
    }

    pub fn local_identity(&self) -> String {
        self.room.local_participant().identity
    }

    pub fn local_participant(&self) -> SessionParticipant {
        self.room.local_participant()
    }

    pub fn remote_participants(&self) -> Vec<SessionParticipant> {
        self.room.remote_participants()
    }

    pub fn has_microphone(&self) -> bool {
        self.room.local_participant().has_audio_track()
    }

    async fn attach(&self, role: ParticipantRole) -> Result<(), ConnectError> {
        self.set_local_metadata(ParticipantMetadata {
            role,
            has_raised_hand: false,
        })
        .await
        .map_err(|err| ConnectError::Transport(err.to_string()))?;

        if role.can_publish_audio() {
            self.publish_microphone(role)
                .await
                .map_err(|err| ConnectError::Publish(err.to_string()))?;
        }
        Ok(())
    }

    /// Listeners never get a microphone track.
    pub async fn publish_microphone(&self, role: ParticipantRole) -> Result<()> {
        if !role.can_publish_audio() {
            return Err(anyhow!("role {role} may not publish audio"));
        }
        if self.has_microphone() {
            return Ok(());
        }
        self.room
            .publish_microphone(AudioCaptureOptions::default())
            .await
            .context("failed to publish microphone track")
    }

    pub async fn unpublish_microphone(&self) -> Result<()> {
        if !self.has_microphone() {
            return Ok(());
        }
        self.room.unpublish_local_tracks().await
    }

    /// Returns the new mute state, or `None` when there is no track to mute.
    pub async fn toggle_mute(&self) -> Result<Option<bool>> {
        let Some(publication) = self
            .room
            .local_participant()
            .audio
            .filter(|publication| publication.has_track)
        else {
            debug!("session: toggle mute ignored, no microphone track");
            return Ok(None);
        };
        let muted = !publication.muted;
        self.room.set_microphone_muted(muted).await?;
        Ok(Some(muted))
    }

    pub async fn set_local_metadata(&self, metadata: ParticipantMetadata) -> Result<()> {
        let encoded = encode_participant_metadata(metadata)?;
        self.room.set_local_metadata(encoded).await
    }

    pub async fn broadcast(&self, envelope: &Envelope) -> Result<()> {
        let payload = envelope.encode()?;
        debug!("session: broadcasting type={}", envelope.body.kind());
        self.room
            .publish_data(payload, DataReliability::Reliable)
            .await
    }

    /// Unpublishes local tracks and leaves. Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(err) = self.room.unpublish_local_tracks().await {
            warn!("session: failed to unpublish local tracks err={err}");
        }
        if let Err(err) = self.room.leave().await {
            warn!("session: failed to leave room err={err}");
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
