//! Application layer of the provider.
//!
//! Use cases here orchestrate the domain types from `nelm_core` against the
//! external collaborators, reached only through the traits in
//! [`collaborators`].  No sockets and no file access live in this layer.
//!
//! # Sub-modules
//!
//! - **`collaborators`** – Interfaces of the configuration source, mastership
//!   service, session controller, device store, credential store, and
//!   reachability prober.
//!
//! - **`device_records`** – Per-device cache of connection state and
//!   discovery progress.
//!
//! - **`lifecycle`** – The mastership-gated connect/disconnect state machine.
//!
//! - **`discovery`** – Capability-driven detail, port, and statistics
//!   discovery.
//!
//! - **`reconcile`** – The reconciliation pass and its periodic schedule.
//!
//! - **`events`** – Filters the three event streams and dispatches work onto
//!   the event pool.
//!
//! - **`provider`** – Start-up and shutdown of all of the above.

pub mod collaborators;
pub mod device_records;
pub mod discovery;
pub mod events;
pub mod lifecycle;
pub mod provider;
pub mod reconcile;
