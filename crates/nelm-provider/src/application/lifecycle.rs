//! ConnectionLifecycleController: the mastership-gated connect/disconnect state machine.
//!
//! A device is connected only while this node holds MASTER for it.
//!
//! | Trigger                          | Effect                                                |
//! |----------------------------------|-------------------------------------------------------|
//! | first seen in configuration      | credentials stored, record enters `KeyStored`         |
//! | MASTER, probe succeeds           | session opened, then `(MASTER, MASTER)` reported      |
//! | MASTER, probe fails              | nothing; the role request stays unacknowledged        |
//! | MASTER, session open fails       | `Disconnected`, key removed, `ConnectionFailure`      |
//! | STANDBY / NONE                   | session closed (graceful), then the role is reported  |
//! | reconciliation finds unreachable | session closed (graceful), store told `disconnected`  |
//! | session dropped by the protocol  | `Disconnected`, store told `disconnected`             |
//! | device removed from the store    | session closed (forced), `Disconnected`               |
//! | shutdown                         | session closed (forced), key removed                  |
//!
//! Only a failed session open is reported back to the caller; every other
//! collaborator failure is logged and absorbed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nelm_core::{Credentials, DeviceDescription, DeviceIdentity, MastershipRole, RoleAssignment};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::collaborators::Collaborators;
use super::device_records::{ConnectionState, DeviceRecordCache};

/// Errors surfaced to the initiator of a role change.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// The protocol session could not be opened.  Credentials for the device
    /// have been revoked and the device is marked disconnected.
    #[error("cannot connect to device {identity}: {reason}")]
    ConnectionFailure {
        identity: DeviceIdentity,
        reason: String,
    },

    /// The role change never ran to completion (the worker executing it died
    /// or the provider stopped first).
    #[error("role change for {0} was not processed")]
    NotProcessed(DeviceIdentity),
}

/// Drives each device through its connection states in response to role
/// changes, reachability changes, and shutdown.
pub struct ConnectionLifecycleController {
    collaborators: Collaborators,
    records: Arc<DeviceRecordCache>,
    active: AtomicBool,
}

impl ConnectionLifecycleController {
    /// Creates an inactive controller.  Role changes are ignored until
    /// [`activate`](Self::activate) is called.
    pub fn new(collaborators: Collaborators, records: Arc<DeviceRecordCache>) -> Self {
        Self {
            collaborators,
            records,
            active: AtomicBool::new(false),
        }
    }

    pub fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Hands `credentials` to the credential store unless the same
    /// credentials are already stored for `id`.
    pub async fn register_credentials(&self, id: &DeviceIdentity, credentials: Credentials) {
        let unchanged = self.records.update(id, |r| {
            r.state != ConnectionState::Unregistered && r.credentials.as_ref() == Some(&credentials)
        });
        if unchanged {
            return;
        }

        match self.collaborators.credentials.store_key(id, &credentials).await {
            Ok(()) => {
                debug!("stored credentials for {id}");
                self.records.update(id, |r| {
                    r.credentials = Some(credentials);
                    if r.state == ConnectionState::Unregistered {
                        r.state = ConnectionState::KeyStored;
                    }
                });
            }
            Err(e) => warn!("failed to store credentials for {id}: {e}"),
        }
    }

    /// Applies a role change.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ConnectionFailure`] if MASTER was assigned,
    /// the device was reachable, and the protocol session could not be opened.
    pub async fn role_changed(&self, assignment: RoleAssignment) -> Result<(), LifecycleError> {
        let RoleAssignment { identity, role } = assignment;
        if !self.is_active() {
            debug!("ignoring {role} for {identity}: provider is not active");
            return Ok(());
        }

        match role {
            MastershipRole::Master => self.connect(&identity).await,
            MastershipRole::Standby | MastershipRole::None => {
                self.release(&identity, role).await;
                Ok(())
            }
        }
    }

    async fn connect(&self, id: &DeviceIdentity) -> Result<(), LifecycleError> {
        let c = &self.collaborators;

        if self.records.state(id) == ConnectionState::Connected {
            debug!("{id} already connected; confirming MASTER");
            c.mastership
                .report_role_accepted(id, MastershipRole::Master, MastershipRole::Master)
                .await;
            return Ok(());
        }

        if !c.prober.probe(id).await {
            info!("{id} is not reachable; MASTER left unacknowledged until the next attempt");
            return Ok(());
        }

        self.records.set_state(id, ConnectionState::Connecting);
        if let Err(e) = c.sessions.open_session(id).await {
            self.fail_connect(id).await;
            error!("cannot open session to {id}: {e}");
            return Err(LifecycleError::ConnectionFailure {
                identity: id.clone(),
                reason: e.to_string(),
            });
        }
        self.records.set_state(id, ConnectionState::Connected);

        // An existing store entry is only ever updated, never re-created.
        if c.store.device(id).await.is_none() {
            let description = self
                .records
                .get(id)
                .and_then(|r| r.last_description)
                .unwrap_or_else(|| DeviceDescription::placeholder(id));
            if let Err(e) = c.store.device_connected(id, description).await {
                warn!("failed to announce {id} to the device store: {e}");
            }
        }

        c.mastership
            .report_role_accepted(id, MastershipRole::Master, MastershipRole::Master)
            .await;
        info!("connected to {id}");
        Ok(())
    }

    async fn fail_connect(&self, id: &DeviceIdentity) {
        let c = &self.collaborators;

        self.records.mark_disconnected(id);
        self.records.update(id, |r| r.credentials = None);

        if c.store.device(id).await.is_some() {
            if let Err(e) = c.store.device_disconnected(id).await {
                warn!("failed to mark {id} disconnected: {e}");
            }
        }
        if let Err(e) = c.credentials.remove_key(id).await {
            warn!("failed to remove credentials for {id}: {e}");
        }
    }

    /// Closes the session after losing MASTER, then reports `role`.
    async fn release(&self, id: &DeviceIdentity, role: MastershipRole) {
        let c = &self.collaborators;
        let was_connected = self.records.state(id) == ConnectionState::Connected;

        if let Err(e) = c.sessions.close_session(id, false).await {
            warn!("failed to close session to {id}: {e}");
        }
        self.records.mark_disconnected(id);

        c.mastership.report_role_accepted(id, role, role).await;
        debug!("accepted {role} for {id}");

        // A standby that never held the session must not flip the
        // availability the current master reported.
        if was_connected && c.store.device(id).await.is_some() {
            if let Err(e) = c.store.device_disconnected(id).await {
                warn!("failed to mark {id} disconnected: {e}");
            }
        }
    }

    /// Reconciliation found the device unreachable while the store still
    /// showed it available.
    pub async fn mark_unreachable(&self, id: &DeviceIdentity) {
        let c = &self.collaborators;

        if self.records.state(id) == ConnectionState::Connected {
            if let Err(e) = c.sessions.close_session(id, false).await {
                warn!("failed to close session to unreachable {id}: {e}");
            }
        }
        self.records.mark_disconnected(id);

        match c.store.device_disconnected(id).await {
            Ok(()) => info!("{id} is no longer reachable"),
            Err(e) => warn!("failed to mark {id} disconnected: {e}"),
        }
    }

    /// The protocol layer reported the session to `id` gone.
    ///
    /// The record leaves its live state, so the next MASTER opens a fresh
    /// session and the next convergence rediscovers ports.
    pub async fn session_lost(&self, id: &DeviceIdentity) {
        let c = &self.collaborators;
        self.records.mark_disconnected(id);

        if c.store.device(id).await.is_none() {
            warn!("{id} does not exist in the device store; it may already have been removed");
            return;
        }
        match c.store.device_disconnected(id).await {
            Ok(()) => debug!("{id} removed from the session controller"),
            Err(e) => warn!("failed to mark {id} disconnected: {e}"),
        }
    }

    /// The device was deleted from the store: force the session shut.
    pub async fn device_removed(&self, id: &DeviceIdentity) {
        debug!("removing device {id}");
        if let Err(e) = self.collaborators.sessions.close_session(id, true).await {
            warn!("failed to force-close session to {id}: {e}");
        }
        self.records.mark_disconnected(id);
    }

    /// Forcefully closes the session to `id` and revokes its credentials.
    pub async fn teardown(&self, id: &DeviceIdentity) {
        let c = &self.collaborators;

        if let Err(e) = c.credentials.remove_key(id).await {
            warn!("failed to remove credentials for {id}: {e}");
        }
        if let Err(e) = c.sessions.close_session(id, true).await {
            warn!("failed to force-close session to {id}: {e}");
        }
        self.records.mark_disconnected(id);
        self.records.update(id, |r| r.credentials = None);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
