//! Storage infrastructure: the configuration file.
//!
//! - **`config`** – TOML schema, load/save, and the [`config::TomlConfigSource`]
//!   that serves the desired device list to the reconciler.
//! - **`watcher`** – Polls the file and publishes configuration events, so an
//!   edited device list is picked up without waiting for the next tick.

pub mod config;
pub mod watcher;
