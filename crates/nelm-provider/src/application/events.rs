//! EventCoordinator: routes the three event streams onto the event worker pool.
//!
//! | Stream        | Relevant when                                              | Action                      |
//! |---------------|------------------------------------------------------------|-----------------------------|
//! | configuration | key is this app's id and kind is `Added` or `Updated`      | full reconciliation pass    |
//! | session       | always                                                     | `DeviceRemoved`: record disconnected, store told `disconnected` if present |
//! | store         | no master assigned, or local master of a device of our scheme | `DeviceAdded`: port discovery; `DeviceRemoved`: forced close, record disconnected |
//!
//! Listener tasks only filter and enqueue.  The work, including the
//! mastership lookups behind the store filter, runs on the pool so a slow
//! collaborator never stalls an event source.

use std::sync::Arc;

use nelm_core::{ConfigEvent, ConfigEventKind, NodeId, SessionEvent, StoreEvent, StoreEventKind};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::collaborators::Collaborators;
use super::discovery::DiscoveryDispatcher;
use super::lifecycle::ConnectionLifecycleController;
use super::reconcile::Reconciler;
use crate::infrastructure::executor::WorkerPool;

/// Subscriptions handed to the provider at start-up.
pub struct EventStreams {
    pub config: broadcast::Receiver<ConfigEvent>,
    pub session: broadcast::Receiver<SessionEvent>,
    pub store: broadcast::Receiver<StoreEvent>,
}

/// Whether a configuration event should trigger reconciliation.
pub fn config_event_is_relevant(event: &ConfigEvent, app_id: &str) -> bool {
    event.config_key == app_id
        && matches!(event.kind, ConfigEventKind::Added | ConfigEventKind::Updated)
}

/// Whether a store event concerns a device this node should act on.
///
/// `local_master` is only consulted when a master is assigned.
pub fn store_event_is_relevant(
    event: &StoreEvent,
    master: Option<NodeId>,
    local_master: bool,
    scheme: &str,
) -> bool {
    if master.is_none() {
        return true;
    }
    local_master
        && event
            .protocol()
            .is_some_and(|protocol| protocol.eq_ignore_ascii_case(scheme))
}

pub struct EventCoordinator {
    collaborators: Collaborators,
    lifecycle: Arc<ConnectionLifecycleController>,
    reconciler: Arc<Reconciler>,
    discovery: Arc<DiscoveryDispatcher>,
    pool: Arc<WorkerPool>,
    app_id: String,
    scheme: String,
}

impl EventCoordinator {
    pub fn new(
        collaborators: Collaborators,
        lifecycle: Arc<ConnectionLifecycleController>,
        reconciler: Arc<Reconciler>,
        discovery: Arc<DiscoveryDispatcher>,
        pool: Arc<WorkerPool>,
        app_id: impl Into<String>,
        scheme: impl Into<String>,
    ) -> Self {
        Self {
            collaborators,
            lifecycle,
            reconciler,
            discovery,
            pool,
            app_id: app_id.into(),
            scheme: scheme.into(),
        }
    }

    /// Spawns one listener task per stream.  Each stops when `shutdown`
    /// fires or its stream closes.
    pub fn spawn_listeners(
        self: Arc<Self>,
        streams: EventStreams,
        shutdown: watch::Receiver<()>,
    ) -> Vec<JoinHandle<()>> {
        let EventStreams {
            config,
            session,
            store,
        } = streams;

        let this = Arc::clone(&self);
        let config_task = tokio::spawn(listen("config", config, shutdown.clone(), move |e| {
            this.on_config_event(e)
        }));
        let this = Arc::clone(&self);
        let session_task = tokio::spawn(listen("session", session, shutdown.clone(), move |e| {
            this.on_session_event(e)
        }));
        let this = self;
        let store_task = tokio::spawn(listen("store", store, shutdown, move |e| {
            this.on_store_event(e)
        }));

        vec![config_task, session_task, store_task]
    }

    pub fn on_config_event(&self, event: ConfigEvent) {
        if !config_event_is_relevant(&event, &self.app_id) {
            return;
        }
        debug!("configuration {:?} for {}; reconciling", event.kind, event.config_key);
        let reconciler = Arc::clone(&self.reconciler);
        self.pool.submit("config reconciliation", async move {
            reconciler.reconcile_all().await;
        });
    }

    pub fn on_session_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::DeviceAdded(id) => {
                debug!("{id} added to the session controller");
            }
            SessionEvent::DeviceRemoved(id) => {
                let lifecycle = Arc::clone(&self.lifecycle);
                self.pool.submit(format!("session removed {id}"), async move {
                    lifecycle.session_lost(&id).await;
                });
            }
        }
    }

    pub fn on_store_event(&self, event: StoreEvent) {
        if event.kind == StoreEventKind::DeviceUpdated {
            return;
        }
        let collaborators = self.collaborators.clone();
        let lifecycle = Arc::clone(&self.lifecycle);
        let discovery = Arc::clone(&self.discovery);
        let scheme = self.scheme.clone();
        let label = format!("store {:?} {}", event.kind, event.identity);

        self.pool.submit(label, async move {
            let id = &event.identity;
            let master = collaborators.mastership.master_for(id).await;
            let local_master = match master {
                Some(_) => collaborators.mastership.is_local_master(id).await,
                None => false,
            };
            if !store_event_is_relevant(&event, master, local_master, &scheme) {
                return;
            }

            match event.kind {
                StoreEventKind::DeviceAdded => discovery.discover_ports(id).await,
                StoreEventKind::DeviceRemoved => lifecycle.device_removed(id).await,
                StoreEventKind::DeviceUpdated => {}
            }
        });
    }
}

async fn listen<E, F>(
    name: &'static str,
    mut events: broadcast::Receiver<E>,
    mut shutdown: watch::Receiver<()>,
    handle: F,
) where
    E: Clone + Send + 'static,
    F: Fn(E) + Send + 'static,
{
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            received = events.recv() => match received {
                Ok(event) => handle(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("{name} listener fell behind; {skipped} events skipped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    debug!("{name} listener stopped");
}
