//! Domain entities for NELM.
//!
//! This module contains pure business types with no infrastructure
//! dependencies: no sockets, no files, no runtime.
//!
//! Code in outer layers (the provider's application and infrastructure
//! layers) depends on the domain, but the domain never depends on them.  This
//! keeps every type here testable without a network or a cluster.

/// Capability registry: optional discovery behaviour a device may implement.
pub mod capability;

/// Device descriptions, ports, statistics, and desired-device entries.
pub mod device;

/// Event payloads delivered by the configuration, session, and store sources.
pub mod events;

/// Stable device identity derived from scheme + address + port.
///
/// See [`identity::DeviceIdentity`] for the main type.
pub mod identity;

/// Mastership roles and role assignments.
pub mod role;
