use shared::domain::{ChatMessage, ParticipantRole, Reaction, RoomMetadata};
use shared::protocol::{Envelope, EnvelopeBody};
use tokio::time::Instant;
use tracing::debug;

use crate::authority::{Capability, PrivilegedAction};
use crate::state::{RoomEvent, REACTION_TTL};

/// Turns one data-channel payload into a state event.
///
/// Anything that does not decode is dropped here, as are envelopes the local
/// participant sent itself.
pub fn inbound_event(
    payload: &[u8],
    sender_identity: Option<&str>,
    local_identity: Option<&str>,
    now: Instant,
) -> Option<RoomEvent> {
    if sender_identity.is_some() && sender_identity == local_identity {
        debug!("protocol: dropping self echo");
        return None;
    }

    let envelope = match Envelope::decode(payload) {
        Ok(envelope) => envelope,
        Err(err) => {
            debug!(
                "protocol: discarding envelope sender={} err={err}",
                sender_identity.unwrap_or("unknown")
            );
            return None;
        }
    };

    match envelope.body {
        EnvelopeBody::RoomMetadata { data } => Some(RoomEvent::MetadataAnnounced(data)),
        EnvelopeBody::ChatMessage { data } => Some(RoomEvent::ChatReceived(data)),
        EnvelopeBody::Reaction { data } => Some(RoomEvent::ReactionReceived {
            reaction: data,
            expires_at: now + REACTION_TTL,
        }),
        EnvelopeBody::HandRaised { identity, name } => {
            Some(RoomEvent::HandRaiseNoticed { identity, name })
        }
        EnvelopeBody::RoleUpdate { identity, role } => {
            Some(RoomEvent::RoleUpdated { identity, role })
        }
        EnvelopeBody::MuteRequest { identity } => Some(RoomEvent::MuteRequested { identity }),
        EnvelopeBody::Unknown => None,
    }
}

pub fn chat_envelope(message: ChatMessage) -> Envelope {
    Envelope::new(EnvelopeBody::ChatMessage { data: message })
}

pub fn reaction_envelope(reaction: Reaction) -> Envelope {
    Envelope::new(EnvelopeBody::Reaction { data: reaction })
}

pub fn hand_raised_envelope(identity: String, name: Option<String>) -> Envelope {
    Envelope::new(EnvelopeBody::HandRaised { identity, name })
}

fn granted(capability: &Capability, action: PrivilegedAction) -> bool {
    capability.action() == action
}

pub fn role_update_envelope(
    capability: &Capability,
    identity: String,
    role: ParticipantRole,
) -> Option<Envelope> {
    granted(capability, PrivilegedAction::PromoteToSpeaker)
        .then(|| Envelope::new(EnvelopeBody::RoleUpdate { identity, role }))
}

pub fn mute_request_envelope(capability: &Capability, identity: String) -> Option<Envelope> {
    granted(capability, PrivilegedAction::RequestMute)
        .then(|| Envelope::new(EnvelopeBody::MuteRequest { identity }))
}

pub fn room_metadata_envelope(capability: &Capability, metadata: RoomMetadata) -> Option<Envelope> {
    granted(capability, PrivilegedAction::AnnounceMetadata)
        .then(|| Envelope::new(EnvelopeBody::RoomMetadata { data: metadata }))
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
