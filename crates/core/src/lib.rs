//! Core types and shared functionality for offcache.
//!
//! This crate provides:
//! - Request identities and the route classifier
//! - Generation-partitioned response store with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod manifest;
pub mod policy;
pub mod request;
pub mod response;
pub mod store;

pub use cache::{CacheDb, Generation, GenerationState};
pub use config::{AppConfig, ConfigError, PolicyConfig};
pub use error::Error;
pub use manifest::Manifest;
pub use policy::{RouteClass, RoutePolicy};
pub use request::RequestIdentity;
pub use response::{HttpResponse, StoredResponse};
pub use store::{GenerationLease, Store};
