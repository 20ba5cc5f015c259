//! # classcast-admission
//!
//! Admission control for shared classroom credentials: device identity
//! resolution, the capacity-bounded admission decision, and the device
//! session lifecycle.
//!
//! ## Modules
//!
//! - `identity` — stable device identity key derivation
//! - `registry` — session registry seam with in-memory and Postgres backends
//! - `controller` — the atomic admit / reuse / evict / reject decision
//! - `lifecycle` — heartbeats, staleness sweep, retention purge, credential
//!   deactivation
//! - `notify` — fire-and-forget eviction notification boundary

pub mod controller;
pub mod identity;
pub mod lifecycle;
pub mod notify;
pub mod registry;

pub use controller::{AdmissionController, AdmissionDecision, RejectReason};
pub use identity::{ConnectionMeta, DeviceIdentityResolver};
pub use lifecycle::{LifecycleManager, StaleSweeper};
pub use notify::{EvictionNotifier, LogNotifier};
pub use registry::SessionRegistry;
