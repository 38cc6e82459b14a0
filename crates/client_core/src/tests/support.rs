//! In-memory stand-in for the media server: every connected peer gets a
//! session whose data messages fan out to the other peers.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use livekit_integration::{
    AudioCaptureOptions, AudioPublication, DataReliability, LiveKitRoomConnector,
    LiveKitRoomEvent, LiveKitRoomOptions, LiveKitRoomSession, SessionParticipant,
};
use shared::api::TokenRequest;
use shared::protocol::Envelope;
use tokio::sync::{broadcast, Notify};

use crate::credentials::{CredentialError, CredentialFetcher, SessionCredential};

struct Peer {
    participant: SessionParticipant,
    events: broadcast::Sender<LiveKitRoomEvent>,
    capture: Option<AudioCaptureOptions>,
    unpublish_calls: u32,
    leave_calls: u32,
}

#[derive(Debug, Clone)]
pub struct SentData {
    pub sender: String,
    pub payload: Vec<u8>,
    pub reliability: DataReliability,
}

#[derive(Default)]
struct HubInner {
    peers: BTreeMap<String, Peer>,
    departed: BTreeMap<String, Peer>,
    sent: Vec<SentData>,
    joins: i64,
}

#[derive(Clone, Default)]
pub struct Hub {
    inner: Arc<Mutex<HubInner>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut HubInner) -> R) -> R {
        let mut guard = self.inner.lock().expect("hub lock");
        f(&mut guard)
    }

    pub fn connector(&self) -> Arc<HubConnector> {
        Arc::new(HubConnector { hub: self.clone() })
    }

    pub fn participant(&self, identity: &str) -> Option<SessionParticipant> {
        self.with(|inner| {
            inner
                .peers
                .get(identity)
                .map(|peer| peer.participant.clone())
        })
    }

    pub fn is_connected(&self, identity: &str) -> bool {
        self.participant(identity).is_some()
    }

    pub fn capture_options(&self, identity: &str) -> Option<AudioCaptureOptions> {
        self.with(|inner| inner.peers.get(identity).and_then(|peer| peer.capture))
    }

    /// `(unpublish_calls, leave_calls)` for a peer that has left.
    pub fn departure_calls(&self, identity: &str) -> Option<(u32, u32)> {
        self.with(|inner| {
            inner
                .departed
                .get(identity)
                .map(|peer| (peer.unpublish_calls, peer.leave_calls))
        })
    }

    pub fn sent_by(&self, identity: &str) -> Vec<Envelope> {
        self.with(|inner| {
            inner
                .sent
                .iter()
                .filter(|sent| sent.sender == identity)
                .filter_map(|sent| Envelope::decode(&sent.payload).ok())
                .collect()
        })
    }

    pub fn sent_data(&self) -> Vec<SentData> {
        self.with(|inner| inner.sent.clone())
    }

    /// Delivers raw bytes to every peer except `from`, as if `from` sent them.
    pub fn inject(&self, from: &str, payload: &[u8]) {
        self.with(|inner| fan_out(inner, from, payload.to_vec()));
    }

    fn join(&self, identity: &str) -> Arc<HubSession> {
        self.with(|inner| {
            let joined_at = Utc
                .timestamp_opt(1_700_000_000, 0)
                .single()
                .map(|base| base + ChronoDuration::seconds(inner.joins));
            inner.joins += 1;
            let participant = SessionParticipant {
                identity: identity.to_string(),
                name: Some(display_name(identity)),
                metadata: None,
                audio: None,
                joined_at,
            };
            for peer in inner.peers.values() {
                let _ = peer
                    .events
                    .send(LiveKitRoomEvent::ParticipantConnected(participant.clone()));
            }
            inner.peers.insert(
                identity.to_string(),
                Peer {
                    participant,
                    events: broadcast::channel(256).0,
                    capture: None,
                    unpublish_calls: 0,
                    leave_calls: 0,
                },
            );
        });
        Arc::new(HubSession {
            hub: self.clone(),
            identity: identity.to_string(),
        })
    }
}

fn display_name(identity: &str) -> String {
    let mut chars = identity.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn fan_out(inner: &mut HubInner, from: &str, payload: Vec<u8>) {
    for (identity, peer) in &inner.peers {
        if identity != from {
            let _ = peer.events.send(LiveKitRoomEvent::DataReceived {
                payload: payload.clone(),
                sender_identity: Some(from.to_string()),
            });
        }
    }
}

pub struct HubSession {
    hub: Hub,
    identity: String,
}

impl HubSession {
    fn with_peer<R>(&self, f: impl FnOnce(&mut Peer) -> R) -> Result<R> {
        self.hub.with(|inner| {
            inner
                .peers
                .get_mut(&self.identity)
                .map(f)
                .ok_or_else(|| anyhow!("peer {} has left", self.identity))
        })
    }
}

#[async_trait]
impl LiveKitRoomSession for HubSession {
    fn local_participant(&self) -> SessionParticipant {
        self.hub
            .participant(&self.identity)
            .unwrap_or_else(|| SessionParticipant {
                identity: self.identity.clone(),
                name: None,
                metadata: None,
                audio: None,
                joined_at: None,
            })
    }

    fn remote_participants(&self) -> Vec<SessionParticipant> {
        self.hub.with(|inner| {
            inner
                .peers
                .iter()
                .filter(|(identity, _)| **identity != self.identity)
                .map(|(_, peer)| peer.participant.clone())
                .collect()
        })
    }

    async fn publish_microphone(&self, options: AudioCaptureOptions) -> Result<()> {
        self.with_peer(|peer| {
            peer.capture = Some(options);
            peer.participant.audio = Some(AudioPublication {
                has_track: true,
                muted: false,
            });
        })
    }

    async fn set_microphone_muted(&self, muted: bool) -> Result<()> {
        self.with_peer(|peer| {
            if let Some(publication) = peer.participant.audio.as_mut() {
                publication.muted = muted;
            }
        })
    }

    async fn unpublish_local_tracks(&self) -> Result<()> {
        self.with_peer(|peer| {
            peer.unpublish_calls += 1;
            peer.participant.audio = None;
        })
    }

    async fn set_local_metadata(&self, metadata: String) -> Result<()> {
        self.with_peer(|peer| peer.participant.metadata = Some(metadata))
    }

    async fn publish_data(&self, payload: Vec<u8>, reliability: DataReliability) -> Result<()> {
        self.hub.with(|inner| {
            inner.sent.push(SentData {
                sender: self.identity.clone(),
                payload: payload.clone(),
                reliability,
            });
            fan_out(inner, &self.identity, payload);
        });
        Ok(())
    }

    async fn leave(&self) -> Result<()> {
        self.hub.with(|inner| {
            if let Some(mut peer) = inner.peers.remove(&self.identity) {
                peer.leave_calls += 1;
                inner.departed.insert(self.identity.clone(), peer);
            }
            for peer in inner.peers.values() {
                let _ = peer.events.send(LiveKitRoomEvent::ParticipantDisconnected {
                    identity: self.identity.clone(),
                });
            }
        });
        Ok(())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<LiveKitRoomEvent> {
        self.hub.with(|inner| match inner.peers.get(&self.identity) {
            Some(peer) => peer.events.subscribe(),
            None => broadcast::channel(1).1,
        })
    }
}

/// Uses the credential token as the joining identity.
pub struct HubConnector {
    hub: Hub,
}

#[async_trait]
impl LiveKitRoomConnector for HubConnector {
    async fn connect(&self, options: LiveKitRoomOptions) -> Result<Arc<dyn LiveKitRoomSession>> {
        Ok(self.hub.join(&options.token))
    }
}

/// Holds every connect until the gate is opened.
pub struct GatedConnector {
    pub inner: Arc<HubConnector>,
    pub gate: Arc<Notify>,
}

#[async_trait]
impl LiveKitRoomConnector for GatedConnector {
    async fn connect(&self, options: LiveKitRoomOptions) -> Result<Arc<dyn LiveKitRoomSession>> {
        self.gate.notified().await;
        self.inner.connect(options).await
    }
}

pub struct FailingConnector;

#[async_trait]
impl LiveKitRoomConnector for FailingConnector {
    async fn connect(&self, _options: LiveKitRoomOptions) -> Result<Arc<dyn LiveKitRoomSession>> {
        Err(anyhow!("could not establish signal connection"))
    }
}

/// Hands out a credential whose token is the requested identity.
pub struct IdentityFetcher;

#[async_trait]
impl CredentialFetcher for IdentityFetcher {
    async fn fetch_credential(
        &self,
        request: &TokenRequest,
    ) -> Result<SessionCredential, CredentialError> {
        let identity = request
            .participant_identity
            .clone()
            .unwrap_or_else(|| "guest".to_string());
        Ok(SessionCredential {
            token: identity,
            url: "wss://hub.test".into(),
        })
    }
}
