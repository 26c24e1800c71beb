//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger()
//!         → broadcast to background tasks (config reload loop)
//!         → cancel tokens handed to in-flight refine calls
//!     Refiner::shutdown() → backend registry releases every handle
//! ```
//!
//! # Design Decisions
//! - Background tasks exit on the broadcast, requests on their token
//! - No detached retries survive shutdown

pub mod shutdown;

pub use shutdown::Shutdown;
