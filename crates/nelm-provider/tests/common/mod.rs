//! Shared test doubles for the provider integration tests.
//!
//! Every double appends to one [`CallLog`], so a test can assert on the
//! exact order in which the provider talked to its collaborators.  The store
//! double is stateful (it remembers descriptions and availability) so that
//! consecutive reconciliation passes see each other's effects.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nelm_core::{
    resolve_identity, CapabilitySet, Credentials, DescriptionDiscovery, DesiredDevice,
    DeviceDescription, DeviceIdentity, DeviceType, DiscoveryError, MastershipRole, NodeId,
    PortDescription, PortStatistics, PortStatisticsDiscovery,
};
use nelm_provider::application::collaborators::{
    CollaboratorError, Collaborators, ConfigReadError, ConfigSource, CredentialStore,
    DeviceStore, MastershipService, ReachabilityProber, SessionController, StoredDevice,
};
use nelm_provider::application::device_records::DeviceRecordCache;
use nelm_provider::application::discovery::DiscoveryDispatcher;
use nelm_provider::application::lifecycle::ConnectionLifecycleController;
use nelm_provider::application::reconcile::Reconciler;

pub const APP_ID: &str = "org.nelm.provider";
pub const SCHEME: &str = "netconf";

/// One observed collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StoreKey(DeviceIdentity),
    RemoveKey(DeviceIdentity),
    OpenSession(DeviceIdentity),
    CloseSession(DeviceIdentity, bool),
    /// `device_connected`, with the `default_available` flag of the description.
    DeviceConnected(DeviceIdentity, bool),
    DeviceDisconnected(DeviceIdentity),
    UpdatePorts(DeviceIdentity, usize),
    UpdatePortStatistics(DeviceIdentity),
    ReportRole(DeviceIdentity, MastershipRole, MastershipRole),
}

#[derive(Default)]
pub struct CallLog {
    calls: Mutex<Vec<Call>>,
}

impl CallLog {
    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    /// Calls that write to the device store.
    pub fn store_writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| {
                matches!(
                    c,
                    Call::DeviceConnected(..)
                        | Call::DeviceDisconnected(_)
                        | Call::UpdatePorts(..)
                        | Call::UpdatePortStatistics(_)
                )
            })
            .collect()
    }
}

// ── Configuration ─────────────────────────────────────────────────────────────

pub struct FakeConfig {
    devices: Mutex<Result<Vec<DesiredDevice>, ConfigReadError>>,
}

impl FakeConfig {
    pub fn new(devices: Vec<DesiredDevice>) -> Self {
        Self {
            devices: Mutex::new(Ok(devices)),
        }
    }

    pub fn set(&self, devices: Vec<DesiredDevice>) {
        *self.devices.lock().unwrap() = Ok(devices);
    }

    pub fn fail(&self, error: ConfigReadError) {
        *self.devices.lock().unwrap() = Err(error);
    }
}

#[async_trait]
impl ConfigSource for FakeConfig {
    async fn desired_devices(&self, _app_id: &str) -> Result<Vec<DesiredDevice>, ConfigReadError> {
        self.devices.lock().unwrap().clone()
    }
}

// ── Mastership ────────────────────────────────────────────────────────────────

pub struct FakeMastership {
    log: Arc<CallLog>,
    local: NodeId,
    masters: Mutex<HashMap<DeviceIdentity, NodeId>>,
}

impl FakeMastership {
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            local: NodeId::random(),
            masters: Mutex::new(HashMap::new()),
        }
    }

    pub fn make_local_master(&self, id: &DeviceIdentity) {
        self.masters.lock().unwrap().insert(id.clone(), self.local);
    }

    pub fn make_remote_master(&self, id: &DeviceIdentity) {
        self.masters.lock().unwrap().insert(id.clone(), NodeId::random());
    }
}

#[async_trait]
impl MastershipService for FakeMastership {
    async fn is_local_master(&self, id: &DeviceIdentity) -> bool {
        self.masters.lock().unwrap().get(id) == Some(&self.local)
    }

    async fn master_for(&self, id: &DeviceIdentity) -> Option<NodeId> {
        self.masters.lock().unwrap().get(id).copied()
    }

    async fn report_role_accepted(
        &self,
        id: &DeviceIdentity,
        requested: MastershipRole,
        accepted: MastershipRole,
    ) {
        self.log.push(Call::ReportRole(id.clone(), requested, accepted));
    }
}

// ── Sessions and credentials ──────────────────────────────────────────────────

pub struct FakeSessions {
    log: Arc<CallLog>,
    refuse: Mutex<HashSet<DeviceIdentity>>,
}

impl FakeSessions {
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            refuse: Mutex::new(HashSet::new()),
        }
    }

    pub fn refuse(&self, id: &DeviceIdentity) {
        self.refuse.lock().unwrap().insert(id.clone());
    }
}

#[async_trait]
impl SessionController for FakeSessions {
    async fn open_session(&self, id: &DeviceIdentity) -> Result<(), CollaboratorError> {
        self.log.push(Call::OpenSession(id.clone()));
        if self.refuse.lock().unwrap().contains(id) {
            return Err(CollaboratorError::Session("authentication failed".to_string()));
        }
        Ok(())
    }

    async fn close_session(
        &self,
        id: &DeviceIdentity,
        force: bool,
    ) -> Result<(), CollaboratorError> {
        self.log.push(Call::CloseSession(id.clone(), force));
        Ok(())
    }
}

pub struct FakeCredentials {
    log: Arc<CallLog>,
}

#[async_trait]
impl CredentialStore for FakeCredentials {
    async fn store_key(
        &self,
        id: &DeviceIdentity,
        _credentials: &Credentials,
    ) -> Result<(), CollaboratorError> {
        self.log.push(Call::StoreKey(id.clone()));
        Ok(())
    }

    async fn remove_key(&self, id: &DeviceIdentity) -> Result<(), CollaboratorError> {
        self.log.push(Call::RemoveKey(id.clone()));
        Ok(())
    }
}

// ── Reachability ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeProber {
    reachable: Mutex<HashSet<DeviceIdentity>>,
}

impl FakeProber {
    pub fn set_reachable(&self, id: &DeviceIdentity, reachable: bool) {
        let mut set = self.reachable.lock().unwrap();
        if reachable {
            set.insert(id.clone());
        } else {
            set.remove(id);
        }
    }
}

#[async_trait]
impl ReachabilityProber for FakeProber {
    async fn probe(&self, id: &DeviceIdentity) -> bool {
        self.reachable.lock().unwrap().contains(id)
    }
}

// ── Device store ──────────────────────────────────────────────────────────────

#[derive(Clone)]
struct StoreEntry {
    description: DeviceDescription,
    available: bool,
    ports: Vec<PortDescription>,
}

pub struct FakeStore {
    log: Arc<CallLog>,
    devices: Mutex<HashMap<DeviceIdentity, StoreEntry>>,
    capabilities: Mutex<HashMap<DeviceIdentity, CapabilitySet>>,
}

impl FakeStore {
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            devices: Mutex::new(HashMap::new()),
            capabilities: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_capabilities(&self, id: &DeviceIdentity, capabilities: CapabilitySet) {
        self.capabilities
            .lock()
            .unwrap()
            .insert(id.clone(), capabilities);
    }

    /// Seeds a device without logging a call.
    pub fn seed(&self, id: &DeviceIdentity, description: DeviceDescription, available: bool) {
        self.devices.lock().unwrap().insert(
            id.clone(),
            StoreEntry {
                description,
                available,
                ports: Vec::new(),
            },
        );
    }

    pub fn description(&self, id: &DeviceIdentity) -> Option<DeviceDescription> {
        self.devices
            .lock()
            .unwrap()
            .get(id)
            .map(|e| e.description.clone())
    }

    pub fn ports(&self, id: &DeviceIdentity) -> Vec<PortDescription> {
        self.devices
            .lock()
            .unwrap()
            .get(id)
            .map(|e| e.ports.clone())
            .unwrap_or_default()
    }

    pub fn available(&self, id: &DeviceIdentity) -> bool {
        self.devices
            .lock()
            .unwrap()
            .get(id)
            .is_some_and(|e| e.available)
    }
}

#[async_trait]
impl DeviceStore for FakeStore {
    async fn device_connected(
        &self,
        id: &DeviceIdentity,
        description: DeviceDescription,
    ) -> Result<(), CollaboratorError> {
        self.log
            .push(Call::DeviceConnected(id.clone(), description.default_available));
        let mut devices = self.devices.lock().unwrap();
        let ports = devices.get(id).map(|e| e.ports.clone()).unwrap_or_default();
        devices.insert(
            id.clone(),
            StoreEntry {
                available: description.default_available,
                description,
                ports,
            },
        );
        Ok(())
    }

    async fn device_disconnected(&self, id: &DeviceIdentity) -> Result<(), CollaboratorError> {
        self.log.push(Call::DeviceDisconnected(id.clone()));
        let mut devices = self.devices.lock().unwrap();
        let entry = devices
            .get_mut(id)
            .ok_or_else(|| CollaboratorError::Store(format!("unknown device {id}")))?;
        entry.available = false;
        Ok(())
    }

    async fn update_ports(
        &self,
        id: &DeviceIdentity,
        ports: Vec<PortDescription>,
    ) -> Result<(), CollaboratorError> {
        self.log.push(Call::UpdatePorts(id.clone(), ports.len()));
        if let Some(entry) = self.devices.lock().unwrap().get_mut(id) {
            entry.ports = ports;
        }
        Ok(())
    }

    async fn update_port_statistics(
        &self,
        id: &DeviceIdentity,
        _statistics: Vec<PortStatistics>,
    ) -> Result<(), CollaboratorError> {
        self.log.push(Call::UpdatePortStatistics(id.clone()));
        Ok(())
    }

    async fn device(&self, id: &DeviceIdentity) -> Option<StoredDevice> {
        let description = self.description(id)?;
        let capabilities = self
            .capabilities
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default();
        Some(StoredDevice {
            identity: id.clone(),
            description,
            capabilities,
        })
    }

    async fn is_available(&self, id: &DeviceIdentity) -> bool {
        self.available(id)
    }
}

// ── Device drivers ────────────────────────────────────────────────────────────

/// Description discovery with a fixed answer.
pub struct StaticDriver {
    pub description: Option<DeviceDescription>,
    pub ports: Vec<PortDescription>,
}

#[async_trait]
impl DescriptionDiscovery for StaticDriver {
    async fn discover_device_details(&self) -> Result<Option<DeviceDescription>, DiscoveryError> {
        Ok(self.description.clone())
    }

    async fn discover_port_details(&self) -> Result<Vec<PortDescription>, DiscoveryError> {
        Ok(self.ports.clone())
    }
}

/// Port counters for ports 1..=`ports`.
pub struct StaticStatistics {
    pub ports: u32,
}

#[async_trait]
impl PortStatisticsDiscovery for StaticStatistics {
    async fn discover_port_statistics(&self) -> Result<Vec<PortStatistics>, DiscoveryError> {
        Ok((1..=self.ports)
            .map(|port_number| PortStatistics {
                port_number,
                ..PortStatistics::default()
            })
            .collect())
    }
}

pub fn make_ports(count: u32) -> Vec<PortDescription> {
    (1..=count)
        .map(|number| PortDescription {
            number,
            name: format!("ge-0/0/{number}"),
            enabled: true,
            speed_mbps: 1000,
        })
        .collect()
}

pub fn make_description(id: &DeviceIdentity) -> DeviceDescription {
    let mut description = DeviceDescription::placeholder(id);
    description.device_type = DeviceType::Router;
    description.manufacturer = "Acme".to_string();
    description.sw_version = "21.4R1".to_string();
    description
}

/// A driver that reports a router with `ports` ports.
pub fn make_driver(id: &DeviceIdentity, ports: u32) -> CapabilitySet {
    CapabilitySet::new().with_description(Arc::new(StaticDriver {
        description: Some(make_description(id)),
        ports: make_ports(ports),
    }))
}

// ── Harness ───────────────────────────────────────────────────────────────────

pub fn make_desired(address: &str, port: u16) -> DesiredDevice {
    DesiredDevice {
        address: address.to_string(),
        port,
        username: "admin".to_string(),
        password: "admin".to_string(),
        ssh_key: None,
    }
}

pub fn make_id(address: &str, port: u16) -> DeviceIdentity {
    resolve_identity(SCHEME, address, port).unwrap()
}

pub struct Harness {
    pub log: Arc<CallLog>,
    pub config: Arc<FakeConfig>,
    pub mastership: Arc<FakeMastership>,
    pub sessions: Arc<FakeSessions>,
    pub store: Arc<FakeStore>,
    pub prober: Arc<FakeProber>,
    pub records: Arc<DeviceRecordCache>,
    pub lifecycle: Arc<ConnectionLifecycleController>,
    pub discovery: Arc<DiscoveryDispatcher>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub fn new(devices: Vec<DesiredDevice>) -> Self {
        let log = Arc::new(CallLog::default());
        let config = Arc::new(FakeConfig::new(devices));
        let mastership = Arc::new(FakeMastership::new(Arc::clone(&log)));
        let sessions = Arc::new(FakeSessions::new(Arc::clone(&log)));
        let store = Arc::new(FakeStore::new(Arc::clone(&log)));
        let prober = Arc::new(FakeProber::default());
        let credentials = Arc::new(FakeCredentials {
            log: Arc::clone(&log),
        });

        let collaborators = Collaborators {
            config: config.clone(),
            mastership: mastership.clone(),
            sessions: sessions.clone(),
            store: store.clone(),
            credentials,
            prober: prober.clone(),
        };

        let records = Arc::new(DeviceRecordCache::new());
        let lifecycle = Arc::new(ConnectionLifecycleController::new(
            collaborators.clone(),
            Arc::clone(&records),
        ));
        lifecycle.activate();
        let discovery = Arc::new(DiscoveryDispatcher::new(
            collaborators.clone(),
            Arc::clone(&records),
        ));
        let reconciler = Arc::new(Reconciler::new(
            collaborators,
            Arc::clone(&records),
            Arc::clone(&lifecycle),
            Arc::clone(&discovery),
            APP_ID,
            SCHEME,
        ));

        Self {
            log,
            config,
            mastership,
            sessions,
            store,
            prober,
            records,
            lifecycle,
            discovery,
            reconciler,
        }
    }

    /// Collaborators wired to this harness's doubles, for building a provider.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            config: self.config.clone(),
            mastership: self.mastership.clone(),
            sessions: self.sessions.clone(),
            store: self.store.clone(),
            credentials: Arc::new(FakeCredentials {
                log: Arc::clone(&self.log),
            }),
            prober: self.prober.clone(),
        }
    }
}
