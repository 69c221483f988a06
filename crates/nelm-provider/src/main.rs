//! nelm-provider standalone daemon entry point.
//!
//! Runs the provider as a single-node cluster against the in-memory
//! collaborators, with the desired device list read from a TOML file.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()           -- settings + desired devices
//!  └─ standalone collaborators
//!       ├─ LocalMastership     (claims every device the store announces)
//!       ├─ InMemoryDeviceStore (store events)
//!       └─ InMemorySessionController (session events)
//!  └─ DeviceProvider::start()
//!       ├─ reconciliation schedule
//!       └─ event listeners
//!  └─ config watcher           (config events)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use nelm_core::{MastershipRole, NodeId, RoleAssignment, StoreEvent, StoreEventKind};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nelm_provider::application::collaborators::Collaborators;
use nelm_provider::application::events::EventStreams;
use nelm_provider::application::provider::{DeviceProvider, ProviderSettings};
use nelm_provider::infrastructure::network::prober::TcpReachabilityProber;
use nelm_provider::infrastructure::standalone::{
    InMemoryCredentialStore, InMemoryDeviceStore, InMemorySessionController, LocalMastership,
};
use nelm_provider::infrastructure::storage::config::{
    config_file_path, load_config, TomlConfigSource,
};
use nelm_provider::infrastructure::storage::watcher::spawn_config_watcher;

#[derive(Debug, Parser)]
#[command(name = "nelm-provider", version, about)]
struct Cli {
    /// Configuration file; defaults to the platform config directory.
    #[arg(long, env = "NELM_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let path = match cli.config {
        Some(path) => path,
        None => config_file_path()?,
    };
    let config = load_config(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.provider.log_level)),
        )
        .init();

    info!("nelm-provider starting with {}", path.display());
    let settings = ProviderSettings::from(&config);

    let mastership = Arc::new(LocalMastership::new(NodeId::random()));
    let store = Arc::new(InMemoryDeviceStore::new());
    let credentials = Arc::new(InMemoryCredentialStore::new());
    let sessions = Arc::new(InMemorySessionController::new(Arc::clone(&credentials)));
    let (config_tx, config_rx) = broadcast::channel(64);

    let collaborators = Collaborators {
        config: Arc::new(TomlConfigSource::new(path.clone())),
        mastership: mastership.clone(),
        sessions: sessions.clone(),
        store: store.clone(),
        credentials,
        prober: Arc::new(TcpReachabilityProber::new(settings.probe_timeout)),
    };

    let streams = EventStreams {
        config: config_rx,
        session: sessions.subscribe(),
        store: store.subscribe(),
    };
    let mastership_events = store.subscribe();

    let provider = Arc::new(DeviceProvider::new(settings.clone(), collaborators));
    provider.start(streams);

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let watcher = spawn_config_watcher(
        path.clone(),
        settings.app_id.clone(),
        config_tx,
        shutdown_rx.clone(),
    )
    .with_context(|| format!("watching {}", path.display()))?;
    let arbiter = spawn_mastership_arbiter(
        Arc::clone(&provider),
        mastership,
        mastership_events,
        shutdown_rx,
    );

    info!("nelm-provider ready.  Press Ctrl-C to exit.");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for the shutdown signal")?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(());
    for task in [watcher, arbiter] {
        if let Err(e) = task.await {
            warn!("background task ended abnormally: {e}");
        }
    }
    provider.shutdown().await;

    info!("nelm-provider stopped");
    Ok(())
}

/// Single-node arbitration: every device the store adds is mastered here,
/// every device it removes is released.
fn spawn_mastership_arbiter(
    provider: Arc<DeviceProvider>,
    mastership: Arc<LocalMastership>,
    mut events: broadcast::Receiver<StoreEvent>,
    mut shutdown: watch::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                received = events.recv() => received,
            };
            let event = match event {
                Ok(event) => event,
                Err(RecvError::Lagged(missed)) => {
                    warn!("mastership arbiter missed {missed} store events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let role = match event.kind {
                StoreEventKind::DeviceAdded => {
                    mastership.claim(&event.identity);
                    MastershipRole::Master
                }
                StoreEventKind::DeviceRemoved => {
                    mastership.release(&event.identity);
                    MastershipRole::None
                }
                StoreEventKind::DeviceUpdated => continue,
            };

            let provider = Arc::clone(&provider);
            tokio::spawn(async move {
                let id = event.identity.clone();
                if let Err(e) = provider
                    .role_changed(RoleAssignment::new(event.identity, role))
                    .await
                {
                    warn!("{role} for {id} failed: {e}");
                }
            });
        }
    })
}
