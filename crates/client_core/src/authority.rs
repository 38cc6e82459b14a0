//! Client-side gate for privileged room actions.
//!
//! This only stops the local UI from emitting actions its role does not
//! allow. Any peer can still put the same bytes on the data channel; binding
//! privilege to a sender needs a capability signed by the session backend.

use shared::domain::ParticipantRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegedAction {
    PromoteToSpeaker,
    RequestMute,
    AnnounceMetadata,
}

/// Proof that the local role passed the gate for one action.
///
/// Privileged envelopes can only be built from a capability, so every send
/// path has to go through [`authorize`] first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    action: PrivilegedAction,
    granted_to: ParticipantRole,
}

impl Capability {
    pub fn action(&self) -> PrivilegedAction {
        self.action
    }

    pub fn granted_to(&self) -> ParticipantRole {
        self.granted_to
    }
}

pub fn is_permitted(role: ParticipantRole, _action: PrivilegedAction) -> bool {
    role.is_moderator()
}

pub fn authorize(role: ParticipantRole, action: PrivilegedAction) -> Option<Capability> {
    is_permitted(role, action).then_some(Capability {
        action,
        granted_to: role,
    })
}
