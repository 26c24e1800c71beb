//! Result cache subsystem.
//!
//! # Data Flow
//! ```text
//! refine request
//!     → key.rs (canonical fingerprint of the request parameters)
//!     → store.rs (TTL + LRU bounded map)
//!         hit  → value returned, entry moved to most-recently-used
//!         miss → backend call, value stored on success
//! ```
//!
//! # Design Decisions
//! - Volatile: rebuilt empty per process, no persistence
//! - One mutex per cache instance; every operation is a short critical section
//! - Expired entries are dropped lazily on access and eagerly by `cleanup`

pub mod key;
pub mod store;

pub use key::cache_key;
pub use store::{CacheEntry, CacheStats, ResultCache};
