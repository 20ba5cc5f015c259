//! Credential domain entities.

pub mod model;

pub use model::{CreateCredential, Credential};
