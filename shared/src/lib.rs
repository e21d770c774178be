//! Persistent storage shared by the mount tooling.
//!
//! # Features
//!
//! - `config-storage` (default): [`ConfigStorage`], rooted at `~/.mount_config/`

#[cfg(feature = "config-storage")]
pub mod config_storage;
pub mod park_state;

#[cfg(feature = "config-storage")]
pub use config_storage::ConfigStorage;
pub use park_state::ParkState;
