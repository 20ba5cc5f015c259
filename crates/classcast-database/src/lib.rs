//! # classcast-database
//!
//! PostgreSQL database connection management and concrete repository
//! implementations for all Classcast entities.

pub mod connection;
pub mod repositories;

pub use connection::DatabasePool;
