//! Device record cache: the provider's own view of every device it manages.
//!
//! Each [`DeviceRecord`] tracks:
//!
//! - the credentials last handed to the credential store;
//! - the last description announced to the device store;
//! - whether ports were discovered during the current session;
//! - whether the device is still listed in configuration;
//! - the local connection state.
//!
//! # Connection lifecycle
//!
//! ```text
//! Unregistered ──► KeyStored ──► Connecting ──► Connected
//!                      ▲              │              │
//!                      │              ▼              ▼
//!                      └────────  Disconnected ◄─────┘
//! ```
//!
//! - `Unregistered`: seen for the first time, credentials not yet stored.
//! - `KeyStored`: credentials handed to the credential store.
//! - `Connecting`: MASTER received, probe succeeded, session being opened.
//! - `Connected`: protocol session open.
//! - `Disconnected`: session closed after role loss, unreachability, or a
//!   failed open.
//!
//! The canonical device store stays authoritative; this cache only keeps the
//! provider from repeating store writes and discovery it has already done.

use std::collections::HashSet;

use dashmap::DashMap;
use nelm_core::{Credentials, DeviceDescription, DeviceIdentity};

/// Local connection state of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unregistered,
    KeyStored,
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionState {
    /// Whether a protocol session is open or being opened.
    pub fn is_live(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

/// Cached state for one device.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub identity: DeviceIdentity,
    pub credentials: Option<Credentials>,
    pub last_description: Option<DeviceDescription>,
    pub ports_discovered: bool,
    pub desired_present: bool,
    pub available: bool,
    pub state: ConnectionState,
}

impl DeviceRecord {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            credentials: None,
            last_description: None,
            ports_discovered: false,
            desired_present: false,
            available: false,
            state: ConnectionState::Unregistered,
        }
    }

    /// Clears the per-session flags after the session ends.
    fn end_session(&mut self) {
        self.ports_discovered = false;
        self.available = false;
    }
}

/// Concurrent map of device records.
///
/// Individual devices are locked independently; there is no cache-wide lock.
/// Closures passed to [`DeviceRecordCache::update`] run under the entry's
/// shard lock and must not call back into the cache.
#[derive(Debug, Default)]
pub struct DeviceRecordCache {
    records: DashMap<DeviceIdentity, DeviceRecord>,
}

impl DeviceRecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the record for `id`.
    pub fn get(&self, id: &DeviceIdentity) -> Option<DeviceRecord> {
        self.records.get(id).map(|r| r.value().clone())
    }

    pub fn contains(&self, id: &DeviceIdentity) -> bool {
        self.records.contains_key(id)
    }

    /// Applies `f` to the record for `id`, creating the record first if needed.
    pub fn update<R>(&self, id: &DeviceIdentity, f: impl FnOnce(&mut DeviceRecord) -> R) -> R {
        let mut entry = self
            .records
            .entry(id.clone())
            .or_insert_with(|| DeviceRecord::new(id.clone()));
        f(entry.value_mut())
    }

    pub fn state(&self, id: &DeviceIdentity) -> ConnectionState {
        self.records
            .get(id)
            .map(|r| r.state)
            .unwrap_or(ConnectionState::Unregistered)
    }

    pub fn set_state(&self, id: &DeviceIdentity, state: ConnectionState) {
        self.update(id, |r| r.state = state);
    }

    pub fn ports_discovered(&self, id: &DeviceIdentity) -> bool {
        self.records.get(id).map(|r| r.ports_discovered).unwrap_or(false)
    }

    /// Records that ports were discovered for the current session.
    pub fn mark_ports_discovered(&self, id: &DeviceIdentity) {
        self.update(id, |r| r.ports_discovered = true);
    }

    /// Records that `description` was announced as available.
    pub fn mark_available(&self, id: &DeviceIdentity, description: DeviceDescription) {
        self.update(id, |r| {
            r.available = true;
            r.last_description = Some(description);
        });
    }

    /// Records the end of a session: live states become `Disconnected` and
    /// the per-session flags are cleared.
    pub fn mark_disconnected(&self, id: &DeviceIdentity) {
        self.update(id, |r| {
            if r.state.is_live() {
                r.state = ConnectionState::Disconnected;
            }
            r.end_session();
        });
    }

    /// Updates `desired_present` on every record: `true` for identities in
    /// `desired`, `false` for the rest.
    pub fn mark_desired(&self, desired: &HashSet<DeviceIdentity>) {
        for mut entry in self.records.iter_mut() {
            let present = desired.contains(entry.key());
            entry.value_mut().desired_present = present;
        }
    }

    /// Drops records that are no longer desired and have no live session.
    /// Returns the dropped identities.
    pub fn prune(&self) -> Vec<DeviceIdentity> {
        let mut dropped = Vec::new();
        self.records.retain(|id, r| {
            let keep = r.desired_present || r.state.is_live();
            if !keep {
                dropped.push(id.clone());
            }
            keep
        });
        dropped
    }

    /// Identities whose credentials reached the credential store.
    pub fn registered(&self) -> Vec<DeviceIdentity> {
        self.records
            .iter()
            .filter(|r| r.state != ConnectionState::Unregistered)
            .map(|r| r.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
