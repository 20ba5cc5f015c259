//! # classcast-core
//!
//! Core crate for Classcast. Contains configuration schemas, shared types,
//! domain events, and the unified error system.
//!
//! This crate has **no** internal dependencies on other Classcast crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
