//! SQLite-backed persistence for cache generations and stored responses.
//!
//! This module provides a persistent, generation-partitioned cache using
//! SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Responses keyed by a SHA-256 of method and canonical URL
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Transactional generation lifecycle transitions

pub mod connection;
pub mod entries;
pub mod generations;
pub mod hash;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::NewEntry;
pub use generations::{Generation, GenerationState};
