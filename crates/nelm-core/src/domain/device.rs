//! Device descriptions, ports, port statistics, and desired-device entries.
//!
//! A [`DeviceDescription`] is what the provider tells the device store about
//! a device.  Before discovery has run it is a *placeholder*: every
//! descriptive field is `"unknown"` and only the address annotations are
//! filled in.  Discovery later replaces it with a richer description, but
//! only when something other than availability actually changed (see
//! [`DeviceDescription::same_details`]).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::identity::DeviceIdentity;

/// Value used for every descriptive field the provider has not learned yet.
pub const UNKNOWN: &str = "unknown";

/// Annotation key holding the device's IP address.
pub const ANNOTATION_IP_ADDRESS: &str = "ipaddress";
/// Annotation key holding the device's management port.
pub const ANNOTATION_PORT: &str = "port";
/// Annotation key holding the upper-cased protocol scheme (e.g. `NETCONF`).
pub const ANNOTATION_PROTOCOL: &str = "protocol";

/// Broad device category reported by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    Switch,
    Router,
    Roadm,
    Otn,
    Other,
}

/// Everything the provider reports about a device to the device store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescription {
    pub uri: String,
    pub device_type: DeviceType,
    pub manufacturer: String,
    pub hw_version: String,
    pub sw_version: String,
    pub serial_number: String,
    pub chassis_id: String,
    /// Whether the store should consider the device available when it is
    /// announced with this description.
    pub default_available: bool,
    pub annotations: BTreeMap<String, String>,
}

impl DeviceDescription {
    /// Builds the pre-discovery description for `identity`.
    ///
    /// All descriptive fields are [`UNKNOWN`], availability is `false`, and the
    /// annotations record the IP address, port, and upper-cased scheme.
    pub fn placeholder(identity: &DeviceIdentity) -> Self {
        let mut annotations = BTreeMap::new();
        annotations.insert(
            ANNOTATION_IP_ADDRESS.to_string(),
            identity.address().to_string(),
        );
        annotations.insert(ANNOTATION_PORT.to_string(), identity.port().to_string());
        annotations.insert(
            ANNOTATION_PROTOCOL.to_string(),
            identity.scheme().to_ascii_uppercase(),
        );

        Self {
            uri: identity.uri(),
            device_type: DeviceType::Switch,
            manufacturer: UNKNOWN.to_string(),
            hw_version: UNKNOWN.to_string(),
            sw_version: UNKNOWN.to_string(),
            serial_number: UNKNOWN.to_string(),
            chassis_id: UNKNOWN.to_string(),
            default_available: false,
            annotations,
        }
    }

    /// Returns a copy with `default_available` set to `available`.
    pub fn with_availability(mut self, available: bool) -> Self {
        self.default_available = available;
        self
    }

    /// Field-by-field comparison of everything except availability.
    ///
    /// Two descriptions with the same details describe the same device state;
    /// re-announcing one over the other is a no-op for the store.
    pub fn same_details(&self, other: &DeviceDescription) -> bool {
        self.uri == other.uri
            && self.device_type == other.device_type
            && self.manufacturer == other.manufacturer
            && self.hw_version == other.hw_version
            && self.sw_version == other.sw_version
            && self.serial_number == other.serial_number
            && self.chassis_id == other.chassis_id
            && self.annotations == other.annotations
    }

    /// Returns the value of annotation `key`, if present.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

/// One port reported by port discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescription {
    pub number: u32,
    pub name: String,
    pub enabled: bool,
    /// Port speed in Mbit/s; `0` when the device does not report it.
    pub speed_mbps: u64,
}

/// Counters for one port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortStatistics {
    pub port_number: u32,
    pub packets_received: u64,
    pub packets_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub packets_rx_dropped: u64,
    pub packets_tx_dropped: u64,
}

/// Material handed to the credential store for one device.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    UsernamePassword { username: String, password: String },
    SshKey { username: String, key: String },
}

impl Credentials {
    pub fn username(&self) -> &str {
        match self {
            Credentials::UsernamePassword { username, .. } => username,
            Credentials::SshKey { username, .. } => username,
        }
    }
}

// Secrets must never reach the logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::UsernamePassword { username, .. } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::SshKey { username, .. } => f
                .debug_struct("SshKey")
                .field("username", username)
                .field("key", &"<redacted>")
                .finish(),
        }
    }
}

/// One entry of the desired device list read from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredDevice {
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,
}

impl DesiredDevice {
    /// Selects key-based credentials when a non-blank key is configured,
    /// otherwise username/password.
    pub fn credentials(&self) -> Credentials {
        match self.ssh_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Credentials::SshKey {
                username: self.username.clone(),
                key: key.to_string(),
            },
            _ => Credentials::UsernamePassword {
                username: self.username.clone(),
                password: self.password.clone(),
            },
        }
    }
}
