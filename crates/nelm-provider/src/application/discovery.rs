//! DiscoveryDispatcher: capability-driven detail, port, and port-statistics discovery.
//!
//! Discovery runs only on the node that masters the device, and only while
//! the device is available.  Every failure is logged and downgraded to "no
//! update this cycle"; the next convergence cycle retries.

use std::sync::Arc;

use nelm_core::{DeviceDescription, DeviceIdentity, PortDescription};
use tracing::{debug, warn};

use super::collaborators::{Collaborators, StoredDevice};
use super::device_records::DeviceRecordCache;

pub struct DiscoveryDispatcher {
    collaborators: Collaborators,
    records: Arc<DeviceRecordCache>,
}

impl DiscoveryDispatcher {
    pub fn new(collaborators: Collaborators, records: Arc<DeviceRecordCache>) -> Self {
        Self {
            collaborators,
            records,
        }
    }

    /// Works out the description to announce for a device that just became
    /// reachable.  The result is always marked available.
    ///
    /// - discovered and different from the stored one: the discovered one;
    /// - discovered and identical: the stored one;
    /// - nothing usable discovered: `placeholder`.
    pub async fn discover_details(
        &self,
        id: &DeviceIdentity,
        placeholder: &DeviceDescription,
    ) -> DeviceDescription {
        let stored = self.collaborators.store.device(id).await;
        let discovered = match &stored {
            Some(device) => self.query_details(device).await,
            None => None,
        };

        let chosen = match (discovered, stored) {
            (Some(found), Some(stored)) if found.same_details(&stored.description) => {
                stored.description
            }
            (Some(found), _) => found,
            (None, _) => placeholder.clone(),
        };
        chosen.with_availability(true)
    }

    async fn query_details(&self, device: &StoredDevice) -> Option<DeviceDescription> {
        let id = &device.identity;
        let Some(capability) = device.capabilities.description() else {
            warn!("no description discovery for {id}; using the default description");
            return None;
        };

        match capability.discover_device_details().await {
            Ok(Some(description)) => Some(description),
            Ok(None) => {
                debug!("{id} returned no usable description");
                None
            }
            Err(e) => {
                warn!("description discovery failed for {id}: {e}");
                None
            }
        }
    }

    /// Discovers details for `id` and announces the device as available.
    pub async fn announce_available(&self, id: &DeviceIdentity, placeholder: &DeviceDescription) {
        let description = self.discover_details(id, placeholder).await;
        match self
            .collaborators
            .store
            .device_connected(id, description.clone())
            .await
        {
            Ok(()) => self.records.mark_available(id, description),
            Err(e) => warn!("failed to announce {id} as available: {e}"),
        }
    }

    /// Discovers ports and port statistics for `id`.
    ///
    /// Does nothing unless this node masters the device and the store shows
    /// it available.  Ports count as discovered only once a non-empty list
    /// reached the store; statistics are only collected after that.
    pub async fn discover_ports(&self, id: &DeviceIdentity) {
        let c = &self.collaborators;

        if !c.mastership.is_local_master(id).await {
            debug!("skipping port discovery for {id}: not the local master");
            return;
        }
        if !c.store.is_available(id).await {
            debug!("skipping port discovery for {id}: not available");
            return;
        }
        let Some(device) = c.store.device(id).await else {
            debug!("skipping port discovery for {id}: not in the device store");
            return;
        };

        let ports = self.query_ports(&device).await;
        if !ports.is_empty() {
            match c.store.update_ports(id, ports).await {
                Ok(()) => self.records.mark_ports_discovered(id),
                Err(e) => warn!("failed to update ports of {id}: {e}"),
            }
        }

        if !self.records.ports_discovered(id) {
            debug!("skipping port statistics for {id}: no ports known yet");
            return;
        }
        match device.capabilities.port_statistics() {
            Some(capability) => match capability.discover_port_statistics().await {
                Ok(statistics) => {
                    if let Err(e) = c.store.update_port_statistics(id, statistics).await {
                        warn!("failed to update port statistics of {id}: {e}");
                    }
                }
                Err(e) => warn!("port statistics discovery failed for {id}: {e}"),
            },
            None => debug!("no port statistics discovery for {id}"),
        }
    }

    async fn query_ports(&self, device: &StoredDevice) -> Vec<PortDescription> {
        let id = &device.identity;
        let result = if let Some(capability) = device.capabilities.description() {
            capability.discover_port_details().await
        } else if let Some(capability) = device.capabilities.ports() {
            capability.ports().await
        } else {
            warn!("no port discovery for {id}");
            return Vec::new();
        };

        result.unwrap_or_else(|e| {
            warn!("port discovery failed for {id}: {e}");
            Vec::new()
        })
    }
}
