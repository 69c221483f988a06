//! Infrastructure layer of the provider.
//!
//! Contains the adapters behind the application's collaborator traits:
//! the TCP reachability prober, the TOML configuration file and its watcher,
//! the in-memory standalone collaborators, and the worker pools the
//! application schedules work on.

pub mod executor;
pub mod network;
pub mod standalone;
pub mod storage;
