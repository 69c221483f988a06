//! Interfaces of the external systems the provider drives.
//!
//! The provider owns none of these: configuration, mastership arbitration,
//! protocol sessions, the device store, and credential storage all live
//! elsewhere.  The application layer talks to them only through the traits
//! below, so every use case can be exercised with in-memory doubles.
//!
//! `infrastructure::standalone` implements all of them for single-node
//! operation; `infrastructure::network::prober` implements the prober.

use std::sync::Arc;

use async_trait::async_trait;
use nelm_core::{
    CapabilitySet, Credentials, DesiredDevice, DeviceDescription, DeviceIdentity, MastershipRole,
    NodeId, PortDescription, PortStatistics,
};
use thiserror::Error;

/// The desired device list could not be read.  The current reconciliation
/// cycle is skipped; the next one retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigReadError {
    #[error("configuration for '{0}' is unavailable")]
    Unavailable(String),
    #[error("configuration is malformed: {0}")]
    Malformed(String),
}

/// A call into an external collaborator failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("protocol session error: {0}")]
    Session(String),
    #[error("device store error: {0}")]
    Store(String),
    #[error("credential store error: {0}")]
    Credentials(String),
}

/// What the device store knows about one device.
#[derive(Debug, Clone)]
pub struct StoredDevice {
    pub identity: DeviceIdentity,
    pub description: DeviceDescription,
    pub capabilities: CapabilitySet,
}

/// Source of the desired device list.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn desired_devices(&self, app_id: &str) -> Result<Vec<DesiredDevice>, ConfigReadError>;
}

/// Cluster-wide mastership arbitration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MastershipService: Send + Sync {
    /// Whether this node currently holds MASTER for `id`.
    async fn is_local_master(&self, id: &DeviceIdentity) -> bool;

    /// The node currently holding MASTER for `id`, if any.
    async fn master_for(&self, id: &DeviceIdentity) -> Option<NodeId>;

    /// Reports the outcome of a role change request.
    async fn report_role_accepted(
        &self,
        id: &DeviceIdentity,
        requested: MastershipRole,
        accepted: MastershipRole,
    );
}

/// Opens and closes management-protocol sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionController: Send + Sync {
    async fn open_session(&self, id: &DeviceIdentity) -> Result<(), CollaboratorError>;

    /// Closes the session.  `force` tears it down without a graceful
    /// protocol-level close.
    async fn close_session(&self, id: &DeviceIdentity, force: bool)
        -> Result<(), CollaboratorError>;
}

/// The authoritative device/topology store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Creates or updates the device with `description`.
    async fn device_connected(
        &self,
        id: &DeviceIdentity,
        description: DeviceDescription,
    ) -> Result<(), CollaboratorError>;

    /// Marks the device unavailable.
    async fn device_disconnected(&self, id: &DeviceIdentity) -> Result<(), CollaboratorError>;

    async fn update_ports(
        &self,
        id: &DeviceIdentity,
        ports: Vec<PortDescription>,
    ) -> Result<(), CollaboratorError>;

    async fn update_port_statistics(
        &self,
        id: &DeviceIdentity,
        statistics: Vec<PortStatistics>,
    ) -> Result<(), CollaboratorError>;

    async fn device(&self, id: &DeviceIdentity) -> Option<StoredDevice>;

    async fn is_available(&self, id: &DeviceIdentity) -> bool;
}

/// Per-device credential storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Stores (or overwrites) the credentials for `id`.
    async fn store_key(
        &self,
        id: &DeviceIdentity,
        credentials: &Credentials,
    ) -> Result<(), CollaboratorError>;

    async fn remove_key(&self, id: &DeviceIdentity) -> Result<(), CollaboratorError>;
}

/// Transport-level liveness check, independent of the protocol session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReachabilityProber: Send + Sync {
    /// `true` only if a transport connection to the device could be opened.
    /// Never fails: errors count as unreachable.
    async fn probe(&self, id: &DeviceIdentity) -> bool;
}

/// Handles to every collaborator, shared by the provider's components.
#[derive(Clone)]
pub struct Collaborators {
    pub config: Arc<dyn ConfigSource>,
    pub mastership: Arc<dyn MastershipService>,
    pub sessions: Arc<dyn SessionController>,
    pub store: Arc<dyn DeviceStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub prober: Arc<dyn ReachabilityProber>,
}
