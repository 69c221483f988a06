//! Optional device behaviour, modelled as a registry of tagged implementations.
//!
//! Not every device driver can describe itself, list its ports, or report
//! port counters.  Instead of probing a device handle's concrete type, the
//! device store hands out a [`CapabilitySet`]: callers ask
//! [`CapabilitySet::supports`] for a [`CapabilityTag`] and fetch the matching
//! trait object through a typed accessor.
//!
//! ```text
//! CapabilitySet
//!  ├─ DescriptionDiscovery      -> device details + port details
//!  ├─ PortDiscovery             -> port list only
//!  └─ PortStatisticsDiscovery   -> per-port counters
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::device::{DeviceDescription, PortDescription, PortStatistics};

/// A discovery call against a device failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("device did not answer the discovery request: {0}")]
    NoResponse(String),
    #[error("device reply could not be interpreted: {0}")]
    Malformed(String),
}

/// Rich discovery: full device details and port details.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DescriptionDiscovery: Send + Sync {
    /// Returns the device's description, or `None` when the device gave
    /// nothing usable.
    async fn discover_device_details(&self) -> Result<Option<DeviceDescription>, DiscoveryError>;

    /// Returns the device's ports.
    async fn discover_port_details(&self) -> Result<Vec<PortDescription>, DiscoveryError>;
}

/// Port listing without device details.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PortDiscovery: Send + Sync {
    async fn ports(&self) -> Result<Vec<PortDescription>, DiscoveryError>;
}

/// Per-port counter retrieval.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PortStatisticsDiscovery: Send + Sync {
    async fn discover_port_statistics(&self) -> Result<Vec<PortStatistics>, DiscoveryError>;
}

/// Key of a capability in a [`CapabilitySet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityTag {
    DescriptionDiscovery,
    PortDiscovery,
    PortStatisticsDiscovery,
}

/// One registered capability implementation.
#[derive(Clone)]
pub enum Capability {
    Description(Arc<dyn DescriptionDiscovery>),
    Ports(Arc<dyn PortDiscovery>),
    PortStatistics(Arc<dyn PortStatisticsDiscovery>),
}

impl Capability {
    pub fn tag(&self) -> CapabilityTag {
        match self {
            Capability::Description(_) => CapabilityTag::DescriptionDiscovery,
            Capability::Ports(_) => CapabilityTag::PortDiscovery,
            Capability::PortStatistics(_) => CapabilityTag::PortStatisticsDiscovery,
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({:?})", self.tag())
    }
}

/// The capabilities a device handle exposes.
///
/// At most one implementation is registered per tag; registering a second
/// one replaces the first.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    entries: HashMap<CapabilityTag, Capability>,
}

impl CapabilitySet {
    /// An empty set: the device supports no optional behaviour.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `capability` under its own tag.
    pub fn insert(&mut self, capability: Capability) {
        self.entries.insert(capability.tag(), capability);
    }

    pub fn with_description(mut self, imp: Arc<dyn DescriptionDiscovery>) -> Self {
        self.insert(Capability::Description(imp));
        self
    }

    pub fn with_ports(mut self, imp: Arc<dyn PortDiscovery>) -> Self {
        self.insert(Capability::Ports(imp));
        self
    }

    pub fn with_port_statistics(mut self, imp: Arc<dyn PortStatisticsDiscovery>) -> Self {
        self.insert(Capability::PortStatistics(imp));
        self
    }

    pub fn supports(&self, tag: CapabilityTag) -> bool {
        self.entries.contains_key(&tag)
    }

    pub fn get(&self, tag: CapabilityTag) -> Option<&Capability> {
        self.entries.get(&tag)
    }

    pub fn description(&self) -> Option<Arc<dyn DescriptionDiscovery>> {
        match self.get(CapabilityTag::DescriptionDiscovery) {
            Some(Capability::Description(imp)) => Some(Arc::clone(imp)),
            _ => None,
        }
    }

    pub fn ports(&self) -> Option<Arc<dyn PortDiscovery>> {
        match self.get(CapabilityTag::PortDiscovery) {
            Some(Capability::Ports(imp)) => Some(Arc::clone(imp)),
            _ => None,
        }
    }

    pub fn port_statistics(&self) -> Option<Arc<dyn PortStatisticsDiscovery>> {
        match self.get(CapabilityTag::PortStatisticsDiscovery) {
            Some(Capability::PortStatistics(imp)) => Some(Arc::clone(imp)),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
