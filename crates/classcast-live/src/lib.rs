//! # classcast-live
//!
//! The live broadcast session state machine: scheduling, the
//! `Scheduled → Starting → Live → Full → Ended` lifecycle, the participant
//! roster, and the presenter control log.
//!
//! Attendee joins are gated through the admission controller in
//! `classcast-admission`; this crate owns `LiveSession` and `Participant`
//! rows and never mutates device sessions directly.

pub mod roster;
pub mod session;

pub use roster::RosterStore;
pub use session::{JoinIdentity, JoinRequest, LiveSessionService, StartLiveSession};
