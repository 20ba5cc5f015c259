//! Participant roles and their capability sets.

use classcast_core::types::Capability;
use serde::{Deserialize, Serialize};

/// The role an actor holds with respect to a live session or credential.
///
/// A closed enum rather than free-form strings; permission checks resolve
/// against each role's capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "participant_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    /// The presenter (teacher) who owns the live session.
    Presenter,
    /// A student device admitted under the shared credential.
    Attendee,
    /// An administrator who manages credentials but does not occupy
    /// capacity.
    Manager,
}

impl ParticipantRole {
    /// The capabilities this role grants.
    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            Self::Presenter => &[
                Capability::StartSession,
                Capability::JoinSession,
                Capability::EndSession,
                Capability::CancelSession,
                Capability::ControlParticipants,
            ],
            Self::Attendee => &[Capability::JoinSession],
            Self::Manager => &[Capability::JoinSession],
        }
    }

    /// Whether this role may perform the given capability.
    pub fn allows(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

impl std::fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Presenter => write!(f, "presenter"),
            Self::Attendee => write!(f, "attendee"),
            Self::Manager => write!(f, "manager"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attendees_cannot_moderate() {
        assert!(ParticipantRole::Attendee.allows(Capability::JoinSession));
        assert!(!ParticipantRole::Attendee.allows(Capability::ControlParticipants));
        assert!(!ParticipantRole::Attendee.allows(Capability::EndSession));
    }

    #[test]
    fn test_only_presenters_start() {
        assert!(ParticipantRole::Presenter.allows(Capability::StartSession));
        assert!(!ParticipantRole::Manager.allows(Capability::StartSession));
    }

    #[test]
    fn test_session_termination_is_presenter_only() {
        assert!(ParticipantRole::Presenter.allows(Capability::EndSession));
        for role in [ParticipantRole::Attendee, ParticipantRole::Manager] {
            assert!(!role.allows(Capability::EndSession));
            assert!(!role.allows(Capability::CancelSession));
            assert!(!role.allows(Capability::ControlParticipants));
        }
    }
}
