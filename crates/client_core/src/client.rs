//! `ClubSpacesClient`: a cloneable handle to the room coordinator actor.
//!
//! The actor task owns the session and all room state. Handles send it
//! commands and read [`RoomSnapshot`]s from a `watch` channel.

use std::future::pending;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use livekit_integration::{LiveKitRoomConnector, LiveKitRoomEvent};
use shared::api::TokenRequest;
use shared::domain::{
    ChatMessage, ChatMessageKind, ParticipantMetadata, ParticipantRole, Reaction, RoomMetadata,
    DEFAULT_MAX_SPEAKERS,
};
use shared::protocol::Envelope;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, sleep_until, Instant, Interval, MissedTickBehavior};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::authority::{authorize, PrivilegedAction};
use crate::credentials::CredentialFetcher;
use crate::error::{describe_connect_error, ConnectError};
use crate::presence::{sample_participants, SAMPLE_INTERVAL};
use crate::protocol;
use crate::session::{establish_session, EstablishedSession, SessionManager};
use crate::state::{reduce, RoomEvent, RoomSnapshot, RoomState, REACTION_TTL};

const COMMAND_CAPACITY: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    pub server_url: String,
    pub participant_identity: Option<String>,
    pub participant_name: Option<String>,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.participant_identity = Some(identity.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.participant_name = Some(name.into());
        self
    }
}

/// What a host supplies when opening a room; the host identity and creation
/// time are filled in once the session is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMetadataDraft {
    pub name: String,
    pub description: Option<String>,
    pub topics: Vec<String>,
    pub is_public: bool,
    pub max_speakers: u32,
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl RoomMetadataDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            topics: Vec::new(),
            is_public: true,
            max_speakers: DEFAULT_MAX_SPEAKERS,
            scheduled_for: None,
        }
    }

    fn into_metadata(self, host_identity: String) -> RoomMetadata {
        RoomMetadata {
            name: self.name,
            description: self.description,
            topics: self.topics,
            is_public: self.is_public,
            max_speakers: self.max_speakers,
            host_identity,
            created_at: Utc::now(),
            scheduled_for: self.scheduled_for,
        }
    }
}

type Reply<T = ()> = oneshot::Sender<Result<T>>;

enum Command {
    Connect {
        room_name: String,
        role: ParticipantRole,
        metadata: Option<RoomMetadataDraft>,
        reply: oneshot::Sender<Result<(), ConnectError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    ToggleMute {
        reply: Reply,
    },
    RaiseHand {
        reply: Reply,
    },
    SendChat {
        content: String,
        reply: Reply,
    },
    SendReaction {
        emoji: String,
        reply: Reply,
    },
    PromoteToSpeaker {
        identity: String,
        reply: Reply,
    },
    MuteParticipant {
        identity: String,
        reply: Reply,
    },
}

struct Established {
    generation: u64,
    result: Result<EstablishedSession, ConnectError>,
}

struct PendingConnect {
    generation: u64,
    metadata: Option<RoomMetadataDraft>,
    reply: oneshot::Sender<Result<(), ConnectError>>,
}

#[derive(Clone)]
pub struct ClubSpacesClient {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<RoomSnapshot>,
}

impl ClubSpacesClient {
    /// Spawns the coordinator actor on the current tokio runtime.
    pub fn spawn(
        config: ClientConfig,
        fetcher: Arc<dyn CredentialFetcher>,
        connector: Arc<dyn LiveKitRoomConnector>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (established_tx, established_rx) = mpsc::channel(4);
        let (snapshot_tx, snapshots) = watch::channel(RoomSnapshot::default());

        let actor = RoomActor {
            config,
            fetcher,
            connector,
            state: RoomState::default(),
            snapshots: snapshot_tx,
            established_tx,
            generation: 0,
            pending: None,
            session: None,
            room_events: None,
            sampler: None,
        };
        tokio::spawn(actor.run(commands_rx, established_rx));

        Self {
            commands: commands_tx,
            snapshots,
        }
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RoomSnapshot> {
        self.snapshots.clone()
    }

    /// Resolves once the session is connected, or with the reason it failed.
    pub async fn connect(
        &self,
        room_name: impl Into<String>,
        role: ParticipantRole,
        metadata: Option<RoomMetadataDraft>,
    ) -> Result<(), ConnectError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Connect {
                room_name: room_name.into(),
                role,
                metadata,
                reply,
            })
            .await
            .map_err(|_| ConnectError::Cancelled)?;
        rx.await.map_err(|_| ConnectError::Cancelled)?
    }

    pub async fn disconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Disconnect { reply })
            .await
            .map_err(|_| actor_stopped())?;
        rx.await.map_err(|_| actor_stopped())
    }

    pub async fn toggle_mute(&self) -> Result<()> {
        self.request(|reply| Command::ToggleMute { reply }).await
    }

    pub async fn raise_hand(&self) -> Result<()> {
        self.request(|reply| Command::RaiseHand { reply }).await
    }

    pub async fn send_chat_message(&self, content: impl Into<String>) -> Result<()> {
        let content = content.into();
        self.request(|reply| Command::SendChat { content, reply })
            .await
    }

    pub async fn send_reaction(&self, emoji: impl Into<String>) -> Result<()> {
        let emoji = emoji.into();
        self.request(|reply| Command::SendReaction { emoji, reply })
            .await
    }

    pub async fn promote_to_speaker(&self, identity: impl Into<String>) -> Result<()> {
        let identity = identity.into();
        self.request(|reply| Command::PromoteToSpeaker { identity, reply })
            .await
    }

    pub async fn mute_participant(&self, identity: impl Into<String>) -> Result<()> {
        let identity = identity.into();
        self.request(|reply| Command::MuteParticipant { identity, reply })
            .await
    }

    async fn request(&self, command: impl FnOnce(Reply) -> Command) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| actor_stopped())?;
        rx.await.map_err(|_| actor_stopped())?
    }
}

fn actor_stopped() -> anyhow::Error {
    anyhow!("room coordinator has stopped")
}

struct RoomActor {
    config: ClientConfig,
    fetcher: Arc<dyn CredentialFetcher>,
    connector: Arc<dyn LiveKitRoomConnector>,
    state: RoomState,
    snapshots: watch::Sender<RoomSnapshot>,
    established_tx: mpsc::Sender<Established>,
    /// Bumped by every connect and disconnect; results from older attempts
    /// are discarded.
    generation: u64,
    pending: Option<PendingConnect>,
    session: Option<SessionManager>,
    room_events: Option<BroadcastStream<LiveKitRoomEvent>>,
    sampler: Option<Interval>,
}

async fn next_room_event(
    events: &mut Option<BroadcastStream<LiveKitRoomEvent>>,
) -> Option<Result<LiveKitRoomEvent, BroadcastStreamRecvError>> {
    match events {
        Some(stream) => stream.next().await,
        None => pending().await,
    }
}

async fn next_sample(sampler: &mut Option<Interval>) {
    match sampler {
        Some(sampler) => {
            sampler.tick().await;
        }
        None => pending().await,
    }
}

async fn reaction_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

impl RoomActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut established: mpsc::Receiver<Established>,
    ) {
        loop {
            let deadline = self.state.next_reaction_expiry();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(result) = established.recv() => self.handle_established(result).await,
                event = next_room_event(&mut self.room_events) => self.handle_room_event(event).await,
                _ = next_sample(&mut self.sampler) => self.sample_presence(),
                _ = reaction_deadline(deadline) => {
                    self.apply(RoomEvent::ReactionsExpired { now: Instant::now() });
                }
            }
            self.publish_snapshot();
        }

        self.teardown().await;
        debug!("client: coordinator stopped");
    }

    fn apply(&mut self, event: RoomEvent) {
        self.state = reduce(std::mem::take(&mut self.state), event);
    }

    fn publish_snapshot(&self) {
        let snapshot = self.state.snapshot(Instant::now());
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    fn local_identity(&self) -> Option<String> {
        self.state.local_identity.clone()
    }

    fn local_name(&self) -> String {
        self.config
            .participant_name
            .clone()
            .or_else(|| self.local_identity())
            .unwrap_or_default()
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect {
                room_name,
                role,
                metadata,
                reply,
            } => self.start_connect(room_name, role, metadata, reply),
            Command::Disconnect { reply } => {
                self.teardown().await;
                self.apply(RoomEvent::Disconnected);
                info!("client: disconnected");
                self.respond(reply, ());
            }
            Command::ToggleMute { reply } => {
                let result = self.toggle_mute().await;
                self.respond(reply, result);
            }
            Command::RaiseHand { reply } => {
                let result = self.raise_hand().await;
                self.respond(reply, result);
            }
            Command::SendChat { content, reply } => {
                let result = self.send_chat(content).await;
                self.respond(reply, result);
            }
            Command::SendReaction { emoji, reply } => {
                let result = self.send_reaction(emoji).await;
                self.respond(reply, result);
            }
            Command::PromoteToSpeaker { identity, reply } => {
                let result = self.promote_to_speaker(identity).await;
                self.respond(reply, result);
            }
            Command::MuteParticipant { identity, reply } => {
                let result = self.mute_participant(identity).await;
                self.respond(reply, result);
            }
        }
    }

    /// Publishes the snapshot before replying so callers observe their own
    /// action once it returns.
    fn respond<T>(&self, reply: oneshot::Sender<T>, value: T) {
        self.publish_snapshot();
        let _ = reply.send(value);
    }

    fn start_connect(
        &mut self,
        room_name: String,
        role: ParticipantRole,
        metadata: Option<RoomMetadataDraft>,
        reply: oneshot::Sender<Result<(), ConnectError>>,
    ) {
        if self.session.is_some() || self.pending.is_some() {
            self.respond(reply, Err(ConnectError::AlreadyActive));
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        self.apply(RoomEvent::ConnectStarted { role });
        self.pending = Some(PendingConnect {
            generation,
            metadata,
            reply,
        });
        info!("client: connecting room={room_name} role={role} generation={generation}");

        let request = TokenRequest {
            room_name,
            participant_name: self.config.participant_name.clone(),
            participant_identity: self.config.participant_identity.clone(),
        };
        let fetcher = Arc::clone(&self.fetcher);
        let connector = Arc::clone(&self.connector);
        let established_tx = self.established_tx.clone();
        tokio::spawn(async move {
            let result = establish_session(fetcher, connector, request, role).await;
            let _ = established_tx
                .send(Established { generation, result })
                .await;
        });
    }

    async fn handle_established(&mut self, established: Established) {
        let Established { generation, result } = established;
        let pending = match self.pending.take() {
            Some(pending) if pending.generation == generation => pending,
            other => {
                self.pending = other;
                if let Ok(late) = result {
                    info!("client: leaving session from abandoned connect generation={generation}");
                    late.session.close().await;
                }
                return;
            }
        };

        match result {
            Ok(EstablishedSession { session, events }) => {
                let local_identity = session.local_identity();
                self.apply(RoomEvent::Connected {
                    local_identity: local_identity.clone(),
                });
                self.room_events = Some(BroadcastStream::new(events));
                let mut sampler = interval(SAMPLE_INTERVAL);
                sampler.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.sampler = Some(sampler);
                self.session = Some(session);

                if let Some(draft) = pending.metadata {
                    self.announce_metadata(draft.into_metadata(local_identity))
                        .await;
                }
                self.respond(pending.reply, Ok(()));
            }
            Err(err) => {
                let message = describe_connect_error(&err);
                warn!("client: connect failed err={err}");
                self.apply(RoomEvent::ConnectFailed { message });
                self.respond(pending.reply, Err(err));
            }
        }
    }

    async fn announce_metadata(&mut self, metadata: RoomMetadata) {
        let Some(capability) = authorize(self.state.local_role, PrivilegedAction::AnnounceMetadata)
        else {
            debug!(
                "client: metadata announcement skipped role={}",
                self.state.local_role
            );
            return;
        };
        if let Some(envelope) = protocol::room_metadata_envelope(&capability, metadata.clone()) {
            self.apply(RoomEvent::MetadataAnnounced(metadata));
            if let Err(err) = self.broadcast(&envelope).await {
                warn!("client: failed to announce room metadata err={err}");
            }
        }
    }

    /// Drops the live session, or cancels a connect that is still in flight.
    async fn teardown(&mut self) {
        self.generation += 1;
        if let Some(pending) = self.pending.take() {
            let _ = pending.reply.send(Err(ConnectError::Cancelled));
        }
        self.room_events = None;
        self.sampler = None;
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }

    async fn handle_room_event(
        &mut self,
        event: Option<Result<LiveKitRoomEvent, BroadcastStreamRecvError>>,
    ) {
        let event = match event {
            Some(Ok(event)) => event,
            Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                warn!("client: room event feed lagged skipped={skipped}");
                return;
            }
            None => {
                warn!("client: room event feed closed");
                self.teardown().await;
                self.apply(RoomEvent::Disconnected);
                return;
            }
        };

        match event {
            LiveKitRoomEvent::Connected => {}
            LiveKitRoomEvent::Disconnected { reason } => {
                warn!(
                    "client: session ended by transport reason={}",
                    reason.as_deref().unwrap_or("unknown")
                );
                self.teardown().await;
                self.apply(RoomEvent::Disconnected);
            }
            LiveKitRoomEvent::ParticipantConnected(participant) => {
                debug!("client: participant joined identity={}", participant.identity);
                self.sample_presence();
            }
            LiveKitRoomEvent::ParticipantDisconnected { identity } => {
                debug!("client: participant left identity={identity}");
                self.apply(RoomEvent::ParticipantLeft { identity });
            }
            LiveKitRoomEvent::DataReceived {
                payload,
                sender_identity,
            } => {
                let local_identity = self.local_identity();
                if let Some(event) = protocol::inbound_event(
                    &payload,
                    sender_identity.as_deref(),
                    local_identity.as_deref(),
                    Instant::now(),
                ) {
                    self.apply_inbound(event).await;
                }
            }
        }
    }

    async fn apply_inbound(&mut self, event: RoomEvent) {
        let local_role_target = match &event {
            RoomEvent::RoleUpdated { identity, .. } => self.state.is_local(identity),
            _ => false,
        };
        self.apply(event);
        if local_role_target {
            self.sync_local_role().await;
        }
    }

    /// Brings the local metadata and microphone in line with the local role.
    async fn sync_local_role(&mut self) {
        let role = self.state.local_role;
        let Some(session) = &self.session else {
            return;
        };
        info!("client: local role changed role={role}");
        let metadata = ParticipantMetadata {
            role,
            has_raised_hand: self.state.has_raised_hand,
        };
        if let Err(err) = session.set_local_metadata(metadata).await {
            warn!("client: failed to republish metadata err={err}");
        }
        let track_update = if role.can_publish_audio() {
            session.publish_microphone(role).await
        } else {
            session.unpublish_microphone().await
        };
        if let Err(err) = track_update {
            warn!("client: failed to update microphone for role={role} err={err}");
        }
        self.sample_presence();
    }

    fn sample_presence(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        let participants = sample_participants(
            &session.local_participant(),
            &session.remote_participants(),
            &self.state,
            Utc::now(),
        );
        self.apply(RoomEvent::PresenceSampled { participants });
    }

    async fn broadcast(&self, envelope: &Envelope) -> Result<()> {
        match &self.session {
            Some(session) => session.broadcast(envelope).await,
            None => Ok(()),
        }
    }

    async fn toggle_mute(&mut self) -> Result<()> {
        let Some(session) = &self.session else {
            return Ok(());
        };
        if let Some(muted) = session.toggle_mute().await? {
            debug!("client: microphone muted={muted}");
        }
        self.sample_presence();
        Ok(())
    }

    async fn raise_hand(&mut self) -> Result<()> {
        let (Some(session), Some(identity)) = (&self.session, self.local_identity()) else {
            return Ok(());
        };
        let raising = !self.state.has_raised_hand;
        if raising && self.state.local_role != ParticipantRole::Listener {
            debug!(
                "client: only listeners raise hands role={}",
                self.state.local_role
            );
            return Ok(());
        }

        session
            .set_local_metadata(ParticipantMetadata {
                role: self.state.local_role,
                has_raised_hand: raising,
            })
            .await?;
        self.apply(RoomEvent::LocalHandRaised(raising));
        if raising {
            let name = self.config.participant_name.clone();
            self.broadcast(&protocol::hand_raised_envelope(identity, name))
                .await?;
        }
        Ok(())
    }

    async fn send_chat(&mut self, content: String) -> Result<()> {
        let content = content.trim();
        let Some(identity) = self.local_identity().filter(|_| self.session.is_some()) else {
            return Ok(());
        };
        if content.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let message = ChatMessage {
            id: format!("msg-{}", now.timestamp_millis()),
            sender_identity: identity,
            sender_name: self.local_name(),
            content: content.to_string(),
            timestamp: now,
            kind: ChatMessageKind::Text,
        };
        self.apply(RoomEvent::ChatReceived(message.clone()));
        self.broadcast(&protocol::chat_envelope(message)).await
    }

    async fn send_reaction(&mut self, emoji: String) -> Result<()> {
        let Some(identity) = self.local_identity().filter(|_| self.session.is_some()) else {
            return Ok(());
        };
        let reaction = Reaction {
            emoji,
            sender_identity: identity,
            timestamp: Utc::now(),
        };
        self.apply(RoomEvent::ReactionReceived {
            reaction: reaction.clone(),
            expires_at: Instant::now() + REACTION_TTL,
        });
        self.broadcast(&protocol::reaction_envelope(reaction)).await
    }

    async fn promote_to_speaker(&mut self, identity: String) -> Result<()> {
        if self.session.is_none() {
            return Ok(());
        }
        let Some(capability) = authorize(self.state.local_role, PrivilegedAction::PromoteToSpeaker)
        else {
            debug!(
                "client: promote denied role={} target={identity}",
                self.state.local_role
            );
            return Ok(());
        };
        let Some(envelope) = protocol::role_update_envelope(
            &capability,
            identity.clone(),
            ParticipantRole::Speaker,
        ) else {
            return Ok(());
        };

        self.broadcast(&envelope).await?;
        self.apply_inbound(RoomEvent::RoleUpdated {
            identity,
            role: ParticipantRole::Speaker,
        })
        .await;
        Ok(())
    }

    async fn mute_participant(&mut self, identity: String) -> Result<()> {
        let Some(session) = &self.session else {
            return Ok(());
        };
        let Some(capability) = authorize(self.state.local_role, PrivilegedAction::RequestMute)
        else {
            debug!(
                "client: mute request denied role={} target={identity}",
                self.state.local_role
            );
            return Ok(());
        };
        let has_track = session
            .remote_participants()
            .iter()
            .any(|participant| participant.identity == identity && participant.has_audio_track());
        if !has_track {
            debug!("client: mute request skipped, no audio track target={identity}");
            return Ok(());
        }

        match protocol::mute_request_envelope(&capability, identity) {
            Some(envelope) => self.broadcast(&envelope).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "tests/client_tests.rs"]
mod tests;
