use std::time::Duration;

use chrono::{DateTime, Utc};
use livekit_integration::SessionParticipant;
use shared::domain::{Participant, ParticipantMetadata};
use tracing::debug;

use crate::state::RoomState;

pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);
pub const SPEAKING_THRESHOLD: f32 = 0.1;
/// Level reported for any published, unmuted microphone. There is no real
/// level metering behind it.
pub const PUBLISHED_AUDIO_LEVEL: f32 = 0.3;
pub const LOCAL_DISPLAY_NAME: &str = "You";

/// Missing or unreadable metadata means a listener without a raised hand.
pub fn parse_participant_metadata(raw: Option<&str>) -> ParticipantMetadata {
    match raw.filter(|raw| !raw.trim().is_empty()) {
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|err| {
            debug!("presence: ignoring unreadable participant metadata err={err}");
            ParticipantMetadata::default()
        }),
        None => ParticipantMetadata::default(),
    }
}

pub fn encode_participant_metadata(metadata: ParticipantMetadata) -> serde_json::Result<String> {
    serde_json::to_string(&metadata)
}

fn is_muted(participant: &SessionParticipant) -> bool {
    match participant.audio {
        Some(publication) if publication.has_track => publication.muted,
        _ => true,
    }
}

fn audio_level(participant: &SessionParticipant) -> f32 {
    if is_muted(participant) {
        0.0
    } else {
        PUBLISHED_AUDIO_LEVEL
    }
}

fn display_name(participant: &SessionParticipant, fallback: &str) -> String {
    participant
        .name
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

fn sampled(
    participant: &SessionParticipant,
    name: String,
    metadata: ParticipantMetadata,
    state: &RoomState,
    now: DateTime<Utc>,
) -> Participant {
    let audio_level = audio_level(participant);
    let joined_at = participant
        .joined_at
        .or_else(|| {
            state
                .participants
                .get(&participant.identity)
                .map(|known| known.joined_at)
        })
        .unwrap_or(now);

    Participant {
        identity: participant.identity.clone(),
        name,
        role: metadata.role,
        is_muted: is_muted(participant),
        is_speaking: audio_level > SPEAKING_THRESHOLD,
        audio_level,
        has_raised_hand: metadata.has_raised_hand,
        joined_at,
    }
}

/// Builds one presence sample from the session's participant lists.
///
/// The local entry always reflects the local role and hand flag. Remote
/// entries read their own metadata, with roles learned from `role_update`
/// taking precedence.
pub fn sample_participants(
    local: &SessionParticipant,
    remotes: &[SessionParticipant],
    state: &RoomState,
    now: DateTime<Utc>,
) -> Vec<Participant> {
    let mut participants = Vec::with_capacity(remotes.len() + 1);
    participants.push(sampled(
        local,
        display_name(local, LOCAL_DISPLAY_NAME),
        ParticipantMetadata {
            role: state.local_role,
            has_raised_hand: state.has_raised_hand,
        },
        state,
        now,
    ));

    for remote in remotes {
        let mut metadata = parse_participant_metadata(remote.metadata.as_deref());
        if let Some(role) = state.known_roles.get(&remote.identity) {
            metadata.role = *role;
        }
        participants.push(sampled(
            remote,
            display_name(remote, &remote.identity),
            metadata,
            state,
            now,
        ));
    }

    participants
}

#[cfg(test)]
#[path = "tests/presence_tests.rs"]
mod tests;
