//! Coordinator state and the single reducer that mutates it.
//!
//! Every change, whether it comes from a local action, the presence sampler,
//! or a protocol message from a peer, is expressed as a [`RoomEvent`] and
//! applied with [`reduce`]. The actor in `client.rs` is the only caller.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use shared::domain::{ChatMessage, Participant, ParticipantRole, Reaction, RoomMetadata};
use tokio::time::Instant;

/// How long a reaction stays visible after it was added locally.
pub const REACTION_TTL: Duration = Duration::from_secs(3);
pub const MAX_NOTICES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomNotice {
    HandRaised {
        identity: String,
        name: Option<String>,
    },
    /// A moderator asked the local participant to mute. Compliance is up to
    /// the user.
    MuteRequested { identity: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveReaction {
    pub reaction: Reaction,
    pub expires_at: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct RoomState {
    pub connection: ConnectionState,
    pub local_identity: Option<String>,
    pub local_role: ParticipantRole,
    pub has_raised_hand: bool,
    pub participants: BTreeMap<String, Participant>,
    /// Roles learned from `role_update` messages, keyed by identity. These win
    /// over whatever a peer last wrote into its own metadata until that peer
    /// leaves the room.
    pub known_roles: HashMap<String, ParticipantRole>,
    pub room_metadata: Option<RoomMetadata>,
    pub chat_messages: Vec<ChatMessage>,
    pub reactions: Vec<ActiveReaction>,
    pub notices: Vec<RoomNotice>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    ConnectStarted { role: ParticipantRole },
    Connected { local_identity: String },
    ConnectFailed { message: String },
    Disconnected,
    ParticipantLeft { identity: String },
    PresenceSampled { participants: Vec<Participant> },
    MetadataAnnounced(RoomMetadata),
    ChatReceived(ChatMessage),
    ReactionReceived {
        reaction: Reaction,
        expires_at: Instant,
    },
    HandRaiseNoticed {
        identity: String,
        name: Option<String>,
    },
    RoleUpdated {
        identity: String,
        role: ParticipantRole,
    },
    MuteRequested { identity: String },
    LocalHandRaised(bool),
    ReactionsExpired { now: Instant },
}

impl RoomEvent {
    /// Events that only make sense while a session is live.
    fn requires_session(&self) -> bool {
        !matches!(
            self,
            Self::ConnectStarted { .. }
                | Self::Connected { .. }
                | Self::ConnectFailed { .. }
                | Self::Disconnected
                | Self::ReactionsExpired { .. }
        )
    }
}

impl RoomState {
    pub fn is_local(&self, identity: &str) -> bool {
        self.local_identity.as_deref() == Some(identity)
    }

    pub fn next_reaction_expiry(&self) -> Option<Instant> {
        self.reactions.iter().map(|active| active.expires_at).min()
    }

    pub fn snapshot(&self, now: Instant) -> RoomSnapshot {
        let mut participants: Vec<Participant> = self.participants.values().cloned().collect();
        participants.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        let local_participant = self
            .local_identity
            .as_ref()
            .and_then(|identity| self.participants.get(identity))
            .cloned();

        RoomSnapshot {
            connection: self.connection,
            local_identity: self.local_identity.clone(),
            local_role: self.local_role,
            has_raised_hand: self.has_raised_hand,
            local_participant,
            participants,
            room_metadata: self.room_metadata.clone(),
            chat_messages: self.chat_messages.clone(),
            reactions: self
                .reactions
                .iter()
                .filter(|active| active.expires_at > now)
                .map(|active| active.reaction.clone())
                .collect(),
            notices: self.notices.clone(),
            last_error: self.last_error.clone(),
        }
    }

    fn push_notice(&mut self, notice: RoomNotice) {
        self.notices.push(notice);
        if self.notices.len() > MAX_NOTICES {
            let overflow = self.notices.len() - MAX_NOTICES;
            self.notices.drain(..overflow);
        }
    }
}

pub fn reduce(mut state: RoomState, event: RoomEvent) -> RoomState {
    if event.requires_session() && state.connection != ConnectionState::Connected {
        return state;
    }

    match event {
        RoomEvent::ConnectStarted { role } => RoomState {
            connection: ConnectionState::Connecting,
            local_role: role,
            ..RoomState::default()
        },
        RoomEvent::Connected { local_identity } => {
            state.connection = ConnectionState::Connected;
            state.local_identity = Some(local_identity);
            state
        }
        RoomEvent::ConnectFailed { message } => RoomState {
            connection: ConnectionState::Failed,
            last_error: Some(message),
            ..RoomState::default()
        },
        RoomEvent::Disconnected => RoomState {
            connection: ConnectionState::Disconnected,
            ..RoomState::default()
        },
        RoomEvent::ParticipantLeft { identity } => {
            state.participants.remove(&identity);
            state.known_roles.remove(&identity);
            state
        }
        RoomEvent::PresenceSampled { participants } => {
            let mut next = BTreeMap::new();
            for mut participant in participants {
                if let Some(previous) = state.participants.get(&participant.identity) {
                    participant.joined_at = previous.joined_at;
                }
                next.insert(participant.identity.clone(), participant);
            }
            // A peer that vanished between samples takes its learned role with it.
            for gone in state.participants.keys().filter(|id| !next.contains_key(*id)) {
                state.known_roles.remove(gone);
            }
            state.participants = next;
            state
        }
        RoomEvent::MetadataAnnounced(metadata) => {
            state.room_metadata = Some(metadata);
            state
        }
        RoomEvent::ChatReceived(message) => {
            state.chat_messages.push(message);
            state
        }
        RoomEvent::ReactionReceived {
            reaction,
            expires_at,
        } => {
            state.reactions.push(ActiveReaction {
                reaction,
                expires_at,
            });
            state
        }
        RoomEvent::HandRaiseNoticed { identity, name } => {
            state.push_notice(RoomNotice::HandRaised { identity, name });
            state
        }
        RoomEvent::RoleUpdated { identity, role } => {
            if state.is_local(&identity) {
                state.local_role = role;
            }
            if let Some(participant) = state.participants.get_mut(&identity) {
                participant.role = role;
            }
            state.known_roles.insert(identity, role);
            state
        }
        RoomEvent::MuteRequested { identity } => {
            if state.is_local(&identity) {
                state.push_notice(RoomNotice::MuteRequested { identity });
            }
            state
        }
        RoomEvent::LocalHandRaised(raised) => {
            state.has_raised_hand = raised;
            let local = state.local_identity.clone();
            if let Some(participant) = local.and_then(|id| state.participants.get_mut(&id)) {
                participant.has_raised_hand = raised;
            }
            state
        }
        RoomEvent::ReactionsExpired { now } => {
            state.reactions.retain(|active| active.expires_at > now);
            state
        }
    }
}

/// Read-only view published to facade subscribers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoomSnapshot {
    pub connection: ConnectionState,
    pub local_identity: Option<String>,
    pub local_role: ParticipantRole,
    pub has_raised_hand: bool,
    pub local_participant: Option<Participant>,
    /// Ordered by join time.
    pub participants: Vec<Participant>,
    pub room_metadata: Option<RoomMetadata>,
    pub chat_messages: Vec<ChatMessage>,
    pub reactions: Vec<Reaction>,
    pub notices: Vec<RoomNotice>,
    pub last_error: Option<String>,
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
