//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RefinerConfig (validated, immutable)
//!     → provider.rs (SharedConfig snapshot read by the refiner)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap inside SharedConfig
//!     → requests started afterwards observe new config
//! ```
//!
//! # Design Decisions
//! - A snapshot never changes; a reload swaps in a whole new one
//! - Every section defaults, so an empty file is a valid config
//! - serde rejects malformed files, validation.rs rejects nonsensical values
//! - A rejected reload keeps the running snapshot

pub mod loader;
pub mod provider;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use provider::{SettingsProvider, SharedConfig};
pub use schema::RefinerConfig;
