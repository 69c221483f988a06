//! DeviceProvider: the facade that owns start-up and shutdown.
//!
//! # Start-up
//!
//! 1. The lifecycle controller is activated, so role changes are accepted.
//! 2. One reconciliation pass is queued on the event pool immediately.
//! 3. The periodic schedule starts (first tick after `initial_delay`).
//! 4. The three event listeners start.
//!
//! # Shutdown
//!
//! 1. Role changes are refused from now on.
//! 2. The schedule and listeners are signalled and awaited; an in-flight
//!    scheduled pass is aborted.
//! 3. The event pool drains and stops.
//! 4. Every registered device is force-disconnected and its credentials
//!    revoked.
//! 5. The connection pool drains and stops.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use nelm_core::{DeviceIdentity, RoleAssignment};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::collaborators::Collaborators;
use super::device_records::DeviceRecordCache;
use super::discovery::DiscoveryDispatcher;
use super::events::{EventCoordinator, EventStreams};
use super::lifecycle::{ConnectionLifecycleController, LifecycleError};
use super::reconcile::Reconciler;
use crate::infrastructure::executor::WorkerPool;

/// Runtime settings of the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    /// Key under which the desired device list is stored in configuration.
    pub app_id: String,
    /// Protocol scheme used to build device identities.
    pub scheme: String,
    /// Delay before the first scheduled reconciliation pass.
    pub initial_delay: Duration,
    /// Interval between scheduled reconciliation passes.
    pub period: Duration,
    pub event_workers: usize,
    pub connection_workers: usize,
    /// Timeout of one reachability probe.
    pub probe_timeout: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            app_id: "org.nelm.provider".to_string(),
            scheme: "netconf".to_string(),
            initial_delay: Duration::from_secs(3),
            period: Duration::from_secs(30),
            event_workers: 5,
            connection_workers: 10,
            probe_timeout: Duration::from_millis(2000),
        }
    }
}

pub struct DeviceProvider {
    settings: ProviderSettings,
    collaborators: Collaborators,
    records: Arc<DeviceRecordCache>,
    lifecycle: Arc<ConnectionLifecycleController>,
    reconciler: Arc<Reconciler>,
    coordinator: Arc<EventCoordinator>,
    event_pool: Arc<WorkerPool>,
    connection_pool: Arc<WorkerPool>,
    shutdown_tx: watch::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DeviceProvider {
    /// Builds the provider and its worker pools.  Must be called from within
    /// a Tokio runtime.
    pub fn new(settings: ProviderSettings, collaborators: Collaborators) -> Self {
        let records = Arc::new(DeviceRecordCache::new());
        let lifecycle = Arc::new(ConnectionLifecycleController::new(
            collaborators.clone(),
            Arc::clone(&records),
        ));
        let discovery = Arc::new(DiscoveryDispatcher::new(
            collaborators.clone(),
            Arc::clone(&records),
        ));
        let reconciler = Arc::new(Reconciler::new(
            collaborators.clone(),
            Arc::clone(&records),
            Arc::clone(&lifecycle),
            Arc::clone(&discovery),
            settings.app_id.clone(),
            settings.scheme.clone(),
        ));
        let event_pool = Arc::new(WorkerPool::new("event", settings.event_workers));
        let connection_pool = Arc::new(WorkerPool::new(
            "connection",
            settings.connection_workers,
        ));
        let coordinator = Arc::new(EventCoordinator::new(
            collaborators.clone(),
            Arc::clone(&lifecycle),
            Arc::clone(&reconciler),
            discovery,
            Arc::clone(&event_pool),
            settings.app_id.clone(),
            settings.scheme.clone(),
        ));
        let (shutdown_tx, _) = watch::channel(());

        Self {
            settings,
            collaborators,
            records,
            lifecycle,
            reconciler,
            coordinator,
            event_pool,
            connection_pool,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    pub fn records(&self) -> &DeviceRecordCache {
        &self.records
    }

    pub fn start(&self, streams: EventStreams) {
        self.lifecycle.activate();

        let reconciler = Arc::clone(&self.reconciler);
        self.event_pool.submit("initial reconciliation", async move {
            reconciler.reconcile_all().await;
        });

        let schedule = Arc::clone(&self.reconciler).spawn_schedule(
            self.settings.initial_delay,
            self.settings.period,
            self.shutdown_tx.subscribe(),
        );
        let listeners = Arc::clone(&self.coordinator)
            .spawn_listeners(streams, self.shutdown_tx.subscribe());

        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        tasks.push(schedule);
        tasks.extend(listeners);
        info!(
            "provider started: scheme {}, polling every {:?}",
            self.settings.scheme, self.settings.period
        );
    }

    /// Applies a role change on the connection pool and waits for its outcome.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::ConnectionFailure`] if the session could not be
    /// opened; [`LifecycleError::NotProcessed`] if the change never ran.
    pub async fn role_changed(&self, assignment: RoleAssignment) -> Result<(), LifecycleError> {
        let id = assignment.identity.clone();
        if !self.lifecycle.is_active() {
            debug!("ignoring {} for {id}: provider is not active", assignment.role);
            return Ok(());
        }
        let label = format!("{} for {}", assignment.role, id);
        let lifecycle = Arc::clone(&self.lifecycle);
        let (tx, rx) = oneshot::channel();

        let queued = self.connection_pool.submit(label, async move {
            let _ = tx.send(lifecycle.role_changed(assignment).await);
        });
        if !queued {
            return Err(LifecycleError::NotProcessed(id));
        }
        rx.await.unwrap_or(Err(LifecycleError::NotProcessed(id)))
    }

    /// Whether `id` currently answers the transport-level probe.
    pub async fn is_reachable(&self, id: &DeviceIdentity) -> bool {
        self.collaborators.prober.probe(id).await
    }

    /// Queues an immediate convergence pass for one configured device.
    pub fn trigger_probe(&self, id: &DeviceIdentity) {
        info!("triggering probe on {id}");
        let reconciler = Arc::clone(&self.reconciler);
        let id = id.clone();
        self.event_pool
            .submit(format!("probe {id}"), async move { reconciler.reconcile_one(&id).await });
    }

    pub async fn shutdown(&self) {
        self.lifecycle.deactivate();
        let _ = self.shutdown_tx.send(());

        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();
        for outcome in futures_util::future::join_all(tasks).await {
            if let Err(e) = outcome {
                error!("background task ended abnormally: {e}");
            }
        }

        self.event_pool.shutdown().await;

        for id in self.records.registered() {
            self.lifecycle.teardown(&id).await;
        }

        self.connection_pool.shutdown().await;
        info!("provider stopped");
    }
}
