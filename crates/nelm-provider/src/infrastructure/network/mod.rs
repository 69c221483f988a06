//! Network infrastructure for the provider.
//!
//! # Sub-modules
//!
//! - **`prober`** – Transport-level reachability check used before every
//!   connection attempt and on every reconciliation pass.  Independent of the
//!   management protocol: a bare TCP connect followed by an immediate close.

pub mod prober;
