//! Live-session operations and the status state machine.

mod service;

pub use service::{JoinIdentity, JoinRequest, LiveSessionService, StartLiveSession};
