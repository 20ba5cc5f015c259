//! Repository implementations for all Classcast entities.

pub mod credential;
pub mod device_session;
pub mod live_session;
pub mod participant;

pub use credential::CredentialRepository;
pub use device_session::DeviceSessionRepository;
pub use live_session::LiveSessionRepository;
pub use participant::ParticipantRepository;
