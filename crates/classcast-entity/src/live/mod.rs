//! Live broadcast session domain entities.

pub mod control;
pub mod model;
pub mod participant;

pub use control::{ControlAction, ControlRecord};
pub use model::{LiveSession, LiveSettings, LiveStatus};
pub use participant::Participant;
