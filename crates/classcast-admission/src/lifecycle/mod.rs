//! Session lifecycle beyond admission: heartbeats, voluntary teardown,
//! credential administration, and the background staleness sweep.

pub mod manager;
pub mod sweep;

pub use manager::LifecycleManager;
pub use sweep::StaleSweeper;
