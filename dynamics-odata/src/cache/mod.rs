//! Caching primitives
//!
//! Components keep a per-instance moka cache in front of an optional
//! external [`CacheStore`]. Loads go through `try_get_with`, so only one
//! fetch per key is in flight at a time.

pub mod store;

pub use store::{CacheStore, MemoryCache, NoopCache};
