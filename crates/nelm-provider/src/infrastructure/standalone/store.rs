//! In-memory device store that publishes [`StoreEvent`]s.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as Slot;
use dashmap::DashMap;
use nelm_core::{
    CapabilitySet, DeviceDescription, DeviceIdentity, PortDescription, PortStatistics, StoreEvent,
    StoreEventKind,
};
use tokio::sync::broadcast;
use tracing::debug;

use crate::application::collaborators::{CollaboratorError, DeviceStore, StoredDevice};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Entry {
    description: DeviceDescription,
    available: bool,
    ports: Vec<PortDescription>,
    statistics: Vec<PortStatistics>,
}

/// Device store for standalone operation.
///
/// Device drivers are registered per identity with
/// [`register_capabilities`](Self::register_capabilities); a device without a
/// registered driver exposes an empty [`CapabilitySet`].
pub struct InMemoryDeviceStore {
    devices: DashMap<DeviceIdentity, Entry>,
    drivers: DashMap<DeviceIdentity, CapabilitySet>,
    events: broadcast::Sender<StoreEvent>,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            devices: DashMap::new(),
            drivers: DashMap::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn register_capabilities(&self, id: &DeviceIdentity, capabilities: CapabilitySet) {
        self.drivers.insert(id.clone(), capabilities);
    }

    /// Deletes the device record and publishes `DeviceRemoved`.
    pub fn remove_device(&self, id: &DeviceIdentity) {
        if let Some((_, entry)) = self.devices.remove(id) {
            self.publish(StoreEventKind::DeviceRemoved, id, &entry.description);
        }
    }

    pub fn ports(&self, id: &DeviceIdentity) -> Vec<PortDescription> {
        self.devices
            .get(id)
            .map(|e| e.ports.clone())
            .unwrap_or_default()
    }

    pub fn port_statistics(&self, id: &DeviceIdentity) -> Vec<PortStatistics> {
        self.devices
            .get(id)
            .map(|e| e.statistics.clone())
            .unwrap_or_default()
    }

    fn publish(&self, kind: StoreEventKind, id: &DeviceIdentity, description: &DeviceDescription) {
        let event = StoreEvent {
            kind,
            identity: id.clone(),
            annotations: description.annotations.clone(),
        };
        if self.events.send(event).is_err() {
            debug!("no store listeners for {kind:?} {id}");
        }
    }

    fn not_found(id: &DeviceIdentity) -> CollaboratorError {
        CollaboratorError::Store(format!("unknown device {id}"))
    }
}

impl Default for InMemoryDeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn device_connected(
        &self,
        id: &DeviceIdentity,
        description: DeviceDescription,
    ) -> Result<(), CollaboratorError> {
        let available = description.default_available;
        let created = match self.devices.entry(id.clone()) {
            Slot::Occupied(mut slot) => {
                let entry = slot.get_mut();
                entry.description = description.clone();
                entry.available = available;
                false
            }
            Slot::Vacant(slot) => {
                slot.insert(Entry {
                    description: description.clone(),
                    available,
                    ports: Vec::new(),
                    statistics: Vec::new(),
                });
                true
            }
        };

        let kind = if created {
            StoreEventKind::DeviceAdded
        } else {
            StoreEventKind::DeviceUpdated
        };
        self.publish(kind, id, &description);
        Ok(())
    }

    async fn device_disconnected(&self, id: &DeviceIdentity) -> Result<(), CollaboratorError> {
        let description = {
            let mut entry = self.devices.get_mut(id).ok_or_else(|| Self::not_found(id))?;
            entry.available = false;
            entry.ports.clear();
            entry.description.clone()
        };
        self.publish(StoreEventKind::DeviceUpdated, id, &description);
        Ok(())
    }

    async fn update_ports(
        &self,
        id: &DeviceIdentity,
        ports: Vec<PortDescription>,
    ) -> Result<(), CollaboratorError> {
        let mut entry = self.devices.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        entry.ports = ports;
        Ok(())
    }

    async fn update_port_statistics(
        &self,
        id: &DeviceIdentity,
        statistics: Vec<PortStatistics>,
    ) -> Result<(), CollaboratorError> {
        let mut entry = self.devices.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        entry.statistics = statistics;
        Ok(())
    }

    async fn device(&self, id: &DeviceIdentity) -> Option<StoredDevice> {
        let description = self.devices.get(id)?.description.clone();
        let capabilities = self
            .drivers
            .get(id)
            .map(|caps| caps.value().clone())
            .unwrap_or_default();
        Some(StoredDevice {
            identity: id.clone(),
            description,
            capabilities,
        })
    }

    async fn is_available(&self, id: &DeviceIdentity) -> bool {
        self.devices.get(id).is_some_and(|e| e.available)
    }
}
