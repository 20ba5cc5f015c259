//! # classcast-entity
//!
//! Domain entities for Classcast.
//!
//! ## Modules
//!
//! - `credential` — shared classroom credentials carrying the capacity contract
//! - `device` — device sessions occupying credential capacity
//! - `live` — live broadcast sessions, participants, and control actions

pub mod credential;
pub mod device;
pub mod live;
pub mod role;

pub use credential::Credential;
pub use device::{DeviceSession, IdentityKey, TerminationReason};
pub use live::{ControlAction, ControlRecord, LiveSession, LiveStatus, Participant};
pub use role::ParticipantRole;
