//! Client side of offcache.
//!
//! This crate provides the origin fetch executor, the interception controller
//! that applies the routing policy, and the generation lifecycle manager.

pub mod fetch;
pub mod intercept;
pub mod lifecycle;

#[cfg(test)]
pub(crate) mod testing;

pub use fetch::{FetchClient, FetchConfig, Fetcher};
pub use intercept::{Intercepted, Interceptor, ResponseSource};
pub use lifecycle::LifecycleManager;
