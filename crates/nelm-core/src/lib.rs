//! # nelm-core
//!
//! Shared domain library for the network element lifecycle manager (NELM).
//!
//! NELM keeps a fleet of remote network elements connected over a
//! session-oriented management protocol, inside a cluster where exactly one
//! node owns ("is master of") each element at a time.  This crate holds the
//! vocabulary every other layer speaks.  It performs no I/O.
//!
//! # Architecture overview
//!
//! - **`domain::identity`** – The stable [`DeviceIdentity`] derived from
//!   `(scheme, address, port)`.  It is the join key used with every external
//!   collaborator (configuration, mastership, protocol sessions, device store,
//!   credential store).
//!
//! - **`domain::device`** – What we know about a device: its
//!   [`DeviceDescription`] (manufacturer, versions, serial, chassis id,
//!   annotations), its ports and port statistics, and the [`DesiredDevice`]
//!   entry read from configuration.
//!
//! - **`domain::role`** – Mastership roles and the ephemeral
//!   [`RoleAssignment`] delivered on every role change.
//!
//! - **`domain::capability`** – Optional device behaviour (detail discovery,
//!   port listing, port statistics) exposed as a registry of tagged
//!   implementations, queried with [`CapabilitySet::supports`].
//!
//! - **`domain::events`** – The three event streams the provider listens to.

pub mod domain;

// Re-export the most-used types at the crate root so callers can write
// `nelm_core::DeviceIdentity` instead of `nelm_core::domain::identity::DeviceIdentity`.
pub use domain::capability::{
    Capability, CapabilitySet, CapabilityTag, DescriptionDiscovery, DiscoveryError,
    PortDiscovery, PortStatisticsDiscovery,
};
pub use domain::device::{
    Credentials, DesiredDevice, DeviceDescription, DeviceType, PortDescription, PortStatistics,
};
pub use domain::events::{ConfigEvent, ConfigEventKind, SessionEvent, StoreEvent, StoreEventKind};
pub use domain::identity::{resolve_identity, DeviceIdentity, IdentityError};
pub use domain::role::{MastershipRole, NodeId, RoleAssignment};
