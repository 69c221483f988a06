//! Reconciler: converges device availability with the desired configuration.
//!
//! [`Reconciler::reconcile_all`] is the single entry point for both triggers:
//! the periodic schedule started by [`Reconciler::spawn_schedule`], and the
//! event coordinator reacting to configuration changes.  Running it twice
//! with nothing changed in between makes no further store writes.
//!
//! # One pass
//!
//! ```text
//! read desired devices ──(error)──► log, skip this pass
//!   │
//!   └─ for each device
//!        ├─ resolve identity          (invalid address: log, skip device)
//!        ├─ store credentials         (no-op when unchanged)
//!        ├─ announce placeholder      (only if the store lacks the device)
//!        └─ converge
//!             ├─ reachable, not available, local master ─► discover + mark available
//!             ├─ reachable, ports unknown                ─► port discovery
//!             └─ unreachable, available                  ─► mark disconnected
//! ```

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use nelm_core::{resolve_identity, DesiredDevice, DeviceDescription, DeviceIdentity};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::collaborators::Collaborators;
use super::device_records::DeviceRecordCache;
use super::discovery::DiscoveryDispatcher;
use super::lifecycle::ConnectionLifecycleController;

pub struct Reconciler {
    collaborators: Collaborators,
    records: Arc<DeviceRecordCache>,
    lifecycle: Arc<ConnectionLifecycleController>,
    discovery: Arc<DiscoveryDispatcher>,
    app_id: String,
    scheme: String,
}

impl Reconciler {
    pub fn new(
        collaborators: Collaborators,
        records: Arc<DeviceRecordCache>,
        lifecycle: Arc<ConnectionLifecycleController>,
        discovery: Arc<DiscoveryDispatcher>,
        app_id: impl Into<String>,
        scheme: impl Into<String>,
    ) -> Self {
        Self {
            collaborators,
            records,
            lifecycle,
            discovery,
            app_id: app_id.into(),
            scheme: scheme.into(),
        }
    }

    /// Runs one full reconciliation pass over the desired device list.
    ///
    /// Never fails: a configuration read error skips the pass, and a failure
    /// while handling one device does not affect the others.
    pub async fn reconcile_all(&self) {
        let Some(devices) = self.desired_devices().await else {
            return;
        };
        info!("checking connection to {} configured devices", devices.len());

        let mut desired = HashSet::with_capacity(devices.len());
        for device in &devices {
            let id = match resolve_identity(&self.scheme, &device.address, device.port) {
                Ok(id) => id,
                Err(e) => {
                    warn!("skipping configured device: {e}");
                    continue;
                }
            };
            desired.insert(id.clone());

            let pass = AssertUnwindSafe(self.reconcile_device(&id, device)).catch_unwind();
            if pass.await.is_err() {
                error!("unhandled failure while reconciling {id}");
            }
        }

        self.records.mark_desired(&desired);
        for id in self.records.prune() {
            debug!("dropped record for {id}: no longer configured");
        }
    }

    /// Runs the per-device steps for `id` alone, if it is still configured.
    pub async fn reconcile_one(&self, id: &DeviceIdentity) {
        let Some(devices) = self.desired_devices().await else {
            return;
        };
        let found = devices.iter().find(|d| {
            resolve_identity(&self.scheme, &d.address, d.port).is_ok_and(|candidate| &candidate == id)
        });
        match found {
            Some(device) => self.reconcile_device(id, device).await,
            None => debug!("{id} is not configured; nothing to probe"),
        }
    }

    async fn desired_devices(&self) -> Option<Vec<DesiredDevice>> {
        match self.collaborators.config.desired_devices(&self.app_id).await {
            Ok(devices) => Some(devices),
            Err(e) => {
                error!("cannot read desired devices: {e}");
                None
            }
        }
    }

    async fn reconcile_device(&self, id: &DeviceIdentity, device: &DesiredDevice) {
        self.records.update(id, |r| r.desired_present = true);
        self.lifecycle
            .register_credentials(id, device.credentials())
            .await;

        let placeholder = DeviceDescription::placeholder(id);
        let store = &self.collaborators.store;
        if store.device(id).await.is_none() {
            if let Err(e) = store.device_connected(id, placeholder.clone()).await {
                warn!("failed to announce {id} to the device store: {e}");
            }
        }

        self.converge(id, &placeholder).await;
    }

    /// Drives one device toward the state its reachability calls for.
    pub async fn converge(&self, id: &DeviceIdentity, placeholder: &DeviceDescription) {
        let c = &self.collaborators;

        if c.store.device(id).await.is_none() {
            warn!("{id} has not been added to the device store, maybe due to a connectivity problem");
            return;
        }

        let reachable = c.prober.probe(id).await;
        let available = c.store.is_available(id).await;
        self.records.update(id, |r| r.available = available);

        match (reachable, available) {
            (true, false) => {
                if !c.mastership.is_local_master(id).await {
                    debug!("{id} is reachable but mastered elsewhere");
                    return;
                }
                self.discovery.announce_available(id, placeholder).await;
                if !self.records.ports_discovered(id) {
                    self.discovery.discover_ports(id).await;
                }
            }
            (true, true) => {
                if !self.records.ports_discovered(id) {
                    self.discovery.discover_ports(id).await;
                }
            }
            (false, true) => self.lifecycle.mark_unreachable(id).await,
            (false, false) => {}
        }
    }

    /// Spawns the periodic schedule: first pass after `initial_delay`, then
    /// every `period` until `shutdown` fires.
    ///
    /// Each pass runs in its own task; a panicking pass is logged and the
    /// next tick still fires.  A pass in flight at shutdown is aborted.
    pub fn spawn_schedule(
        self: Arc<Self>,
        initial_delay: Duration,
        period: Duration,
        mut shutdown: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + initial_delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }

                let this = Arc::clone(&self);
                let mut pass = tokio::spawn(async move { this.reconcile_all().await });
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => {
                        pass.abort();
                        break;
                    }
                    outcome = &mut pass => {
                        if let Err(e) = outcome {
                            error!("reconciliation pass failed: {e}");
                        }
                    }
                }
            }
            debug!("reconciliation schedule stopped");
        })
    }
}
