//! Credential storage and session bookkeeping for standalone operation.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use nelm_core::{Credentials, DeviceIdentity, SessionEvent};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::application::collaborators::{CollaboratorError, CredentialStore, SessionController};

const EVENT_CAPACITY: usize = 256;

#[derive(Default)]
pub struct InMemoryCredentialStore {
    keys: DashMap<DeviceIdentity, Credentials>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &DeviceIdentity) -> Option<Credentials> {
        self.keys.get(id).map(|c| c.value().clone())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn store_key(
        &self,
        id: &DeviceIdentity,
        credentials: &Credentials,
    ) -> Result<(), CollaboratorError> {
        self.keys.insert(id.clone(), credentials.clone());
        Ok(())
    }

    async fn remove_key(&self, id: &DeviceIdentity) -> Result<(), CollaboratorError> {
        self.keys.remove(id);
        Ok(())
    }
}

/// Tracks which devices have an open session.
///
/// A session can only be opened for a device whose credentials are stored.
/// Opening and closing publish [`SessionEvent`]s.
pub struct InMemorySessionController {
    credentials: Arc<InMemoryCredentialStore>,
    open: DashSet<DeviceIdentity>,
    events: broadcast::Sender<SessionEvent>,
}

impl InMemorySessionController {
    pub fn new(credentials: Arc<InMemoryCredentialStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            credentials,
            open: DashSet::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn is_open(&self, id: &DeviceIdentity) -> bool {
        self.open.contains(id)
    }

    fn publish(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("no session listeners");
        }
    }
}

#[async_trait]
impl SessionController for InMemorySessionController {
    async fn open_session(&self, id: &DeviceIdentity) -> Result<(), CollaboratorError> {
        let credentials = self
            .credentials
            .get(id)
            .ok_or_else(|| CollaboratorError::Session(format!("no credentials for {id}")))?;

        if self.open.insert(id.clone()) {
            info!("session opened to {id} as {}", credentials.username());
            self.publish(SessionEvent::DeviceAdded(id.clone()));
        }
        Ok(())
    }

    async fn close_session(
        &self,
        id: &DeviceIdentity,
        force: bool,
    ) -> Result<(), CollaboratorError> {
        if self.open.remove(id).is_some() {
            info!("session to {id} closed (force: {force})");
            self.publish(SessionEvent::DeviceRemoved(id.clone()));
        }
        Ok(())
    }
}
