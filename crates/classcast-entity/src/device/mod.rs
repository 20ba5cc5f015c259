//! Device session domain entities.

pub mod identity;
pub mod model;

pub use identity::IdentityKey;
pub use model::{DeviceSession, NewDeviceSession, TerminationReason};
