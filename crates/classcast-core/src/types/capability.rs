//! Capabilities granted to live-session roles.

use serde::{Deserialize, Serialize};

/// A single permission inside a live session.
///
/// Authorization checks ask whether a role's capability set contains the
/// required capability instead of comparing role names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Bring a scheduled session live.
    StartSession,
    /// Join the session roster.
    JoinSession,
    /// End the session for everyone.
    EndSession,
    /// Cancel the session before or during broadcast.
    CancelSession,
    /// Issue mute/video/remove controls against other participants.
    ControlParticipants,
}
