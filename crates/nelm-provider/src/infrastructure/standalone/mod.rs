//! Standalone mode: every collaborator implemented in memory for a
//! single-node deployment.
//!
//! - **`mastership`** – [`LocalMastership`], where this node claims each
//!   device the store announces.
//! - **`store`** – [`InMemoryDeviceStore`] publishing store events.
//! - **`sessions`** – [`InMemoryCredentialStore`] and
//!   [`InMemorySessionController`]; a session only opens for a device with
//!   stored credentials.

pub mod mastership;
pub mod sessions;
pub mod store;

pub use mastership::LocalMastership;
pub use sessions::{InMemoryCredentialStore, InMemorySessionController};
pub use store::InMemoryDeviceStore;
