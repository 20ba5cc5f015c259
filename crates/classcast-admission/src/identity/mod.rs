//! Device identity key derivation.

pub mod resolver;

pub use resolver::{ConnectionMeta, DeviceIdentityResolver};
