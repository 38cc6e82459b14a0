//! Client-side coordinator for ClubSpaces live audio rooms.
//!
//! [`ClubSpacesClient`] joins a room through a [`CredentialFetcher`] and a
//! [`livekit_integration::LiveKitRoomConnector`], keeps role and presence
//! state for every participant, and carries chat, reactions and moderation
//! messages over the room's data channel.

pub mod authority;
pub mod client;
pub mod credentials;
pub mod directory;
pub mod error;
pub mod presence;
pub mod protocol;
pub mod session;
pub mod state;

pub use authority::{authorize, Capability, PrivilegedAction};
pub use client::{ClientConfig, ClubSpacesClient, RoomMetadataDraft};
pub use credentials::{
    CredentialError, CredentialFetcher, HttpCredentialFetcher, MissingCredentialFetcher,
    SessionCredential,
};
pub use directory::{
    create_room_or_fallback, parse_room_reference, resolve_room_reference, CreatedRoom,
    HttpRoomDirectory, MissingRoomDirectory, RoomDirectory, RoomReference,
};
pub use error::{describe_connect_error, describe_connect_failure, ConnectError};
pub use state::{ConnectionState, RoomNotice, RoomSnapshot};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
