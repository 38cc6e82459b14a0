//! Boundary between the room coordinator and the real-time media session.
//!
//! The coordinator never talks to an SFU directly. It consumes a connected
//! [`LiveKitRoomSession`] obtained from a [`LiveKitRoomConnector`], which
//! exposes participant lists, the local microphone track, per-participant
//! metadata and the data channel.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveKitRoomOptions {
    pub url: String,
    pub token: String,
}

/// Capture processing requested when the microphone track is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioCaptureOptions {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for AudioCaptureOptions {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataReliability {
    Reliable,
    Lossy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioPublication {
    /// False while the publication exists but no track is attached yet.
    pub has_track: bool,
    pub muted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParticipant {
    pub identity: String,
    pub name: Option<String>,
    /// Raw metadata string the participant attached to itself.
    pub metadata: Option<String>,
    pub audio: Option<AudioPublication>,
    pub joined_at: Option<DateTime<Utc>>,
}

impl SessionParticipant {
    pub fn has_audio_track(&self) -> bool {
        self.audio.is_some_and(|publication| publication.has_track)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveKitRoomEvent {
    Connected,
    Disconnected {
        reason: Option<String>,
    },
    ParticipantConnected(SessionParticipant),
    ParticipantDisconnected {
        identity: String,
    },
    DataReceived {
        payload: Vec<u8>,
        sender_identity: Option<String>,
    },
}

#[async_trait]
pub trait LiveKitRoomSession: Send + Sync {
    fn local_participant(&self) -> SessionParticipant;
    fn remote_participants(&self) -> Vec<SessionParticipant>;
    async fn publish_microphone(&self, options: AudioCaptureOptions) -> anyhow::Result<()>;
    async fn set_microphone_muted(&self, muted: bool) -> anyhow::Result<()>;
    /// Stops and unpublishes every local track.
    async fn unpublish_local_tracks(&self) -> anyhow::Result<()>;
    async fn set_local_metadata(&self, metadata: String) -> anyhow::Result<()>;
    async fn publish_data(
        &self,
        payload: Vec<u8>,
        reliability: DataReliability,
    ) -> anyhow::Result<()>;
    async fn leave(&self) -> anyhow::Result<()>;
    fn subscribe_events(&self) -> broadcast::Receiver<LiveKitRoomEvent>;
}

#[async_trait]
pub trait LiveKitRoomConnector: Send + Sync {
    /// Resolves once the transport has confirmed the connection.
    async fn connect(
        &self,
        options: LiveKitRoomOptions,
    ) -> anyhow::Result<Arc<dyn LiveKitRoomSession>>;
}
