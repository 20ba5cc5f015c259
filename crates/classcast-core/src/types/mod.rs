//! Shared domain types.

pub mod capability;

pub use capability::Capability;
