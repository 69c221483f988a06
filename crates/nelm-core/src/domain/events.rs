//! Event payloads consumed by the provider's event coordinator.
//!
//! Three independent sources publish events:
//!
//! - the configuration source ([`ConfigEvent`]) when a configuration entry
//!   is added, updated, or removed;
//! - the protocol session controller ([`SessionEvent`]) when a device joins
//!   or leaves the protocol-level topology;
//! - the device store ([`StoreEvent`]) when a device record is added,
//!   removed, or updated.

use std::collections::BTreeMap;

use super::device::ANNOTATION_PROTOCOL;
use super::identity::DeviceIdentity;

/// Kind of configuration change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigEventKind {
    Added,
    Updated,
    Removed,
}

/// A configuration entry changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEvent {
    /// Key of the configuration entry, normally the owning application id.
    pub config_key: String,
    pub kind: ConfigEventKind,
}

/// Protocol-level topology change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    DeviceAdded(DeviceIdentity),
    DeviceRemoved(DeviceIdentity),
}

impl SessionEvent {
    pub fn identity(&self) -> &DeviceIdentity {
        match self {
            SessionEvent::DeviceAdded(id) | SessionEvent::DeviceRemoved(id) => id,
        }
    }
}

/// Kind of device store change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEventKind {
    DeviceAdded,
    DeviceRemoved,
    DeviceUpdated,
}

/// A device record changed in the device store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub kind: StoreEventKind,
    pub identity: DeviceIdentity,
    /// Annotations of the stored description at the time of the event.
    pub annotations: BTreeMap<String, String>,
}

impl StoreEvent {
    /// The `protocol` annotation of the device, if the store recorded one.
    pub fn protocol(&self) -> Option<&str> {
        self.annotations.get(ANNOTATION_PROTOCOL).map(String::as_str)
    }
}
