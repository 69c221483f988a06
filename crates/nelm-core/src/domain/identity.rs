//! Device identity domain entity.
//!
//! A [`DeviceIdentity`] is the key that joins a device across every external
//! collaborator: the configuration source lists it by address and port, the
//! mastership service arbitrates it, the protocol session controller connects
//! to it, and the device store records it.
//!
//! # Text form
//!
//! The canonical text form is `scheme:host:port`, with IPv6 hosts bracketed:
//!
//! ```text
//! netconf:10.0.0.1:830
//! netconf:[2001:db8::1]:830
//! ```
//!
//! Parsing also accepts the unbracketed IPv6 form (`netconf:2001:db8::1:830`)
//! by treating everything after the last colon as the port.  Consumers that
//! need a transport endpoint never re-parse the string: the identity carries a
//! typed [`SocketAddr`].

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when an identity cannot be derived.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// The address/port pair cannot be turned into a transport endpoint.
    #[error("invalid device address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The protocol scheme is empty or contains characters not allowed in a URI scheme.
    #[error("invalid protocol scheme '{0}'")]
    InvalidScheme(String),
}

/// Stable, deterministic device key built from `(scheme, address, port)`.
///
/// Two identities are equal exactly when scheme, IP address, and port are
/// equal, so every cluster node computes the same key for the same device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceIdentity {
    scheme: String,
    endpoint: SocketAddr,
}

impl DeviceIdentity {
    /// The protocol scheme, lower-cased (e.g. `"netconf"`).
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The device's IP address.
    pub fn address(&self) -> IpAddr {
        self.endpoint.ip()
    }

    /// The device's management port.
    pub fn port(&self) -> u16 {
        self.endpoint.port()
    }

    /// The transport endpoint used by the reachability probe.
    pub fn socket_addr(&self) -> SocketAddr {
        self.endpoint
    }

    /// The identity rendered as a URI string (same as `Display`).
    pub fn uri(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SocketAddr already brackets IPv6 hosts.
        write!(f, "{}:{}", self.scheme, self.endpoint)
    }
}

/// Derives the identity of the device at `address`:`port` for `scheme`.
///
/// `address` must be an IP literal; a bracketed IPv6 literal (`[::1]`) is
/// accepted.  Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns [`IdentityError::InvalidAddress`] if the address is not an IP
/// literal or the port is zero, and [`IdentityError::InvalidScheme`] for an
/// unusable scheme.
pub fn resolve_identity(
    scheme: &str,
    address: &str,
    port: u16,
) -> Result<DeviceIdentity, IdentityError> {
    let scheme = normalize_scheme(scheme)?;

    let trimmed = address.trim();
    let host = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(trimmed);

    let ip: IpAddr = host.parse().map_err(|_| IdentityError::InvalidAddress {
        address: address.to_string(),
        reason: "not an IP address literal".to_string(),
    })?;

    if port == 0 {
        return Err(IdentityError::InvalidAddress {
            address: address.to_string(),
            reason: "port must be in 1..=65535".to_string(),
        });
    }

    Ok(DeviceIdentity {
        scheme,
        endpoint: SocketAddr::new(ip, port),
    })
}

fn normalize_scheme(scheme: &str) -> Result<String, IdentityError> {
    let valid = !scheme.is_empty()
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if valid {
        Ok(scheme.to_ascii_lowercase())
    } else {
        Err(IdentityError::InvalidScheme(scheme.to_string()))
    }
}

impl FromStr for DeviceIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| IdentityError::InvalidAddress {
            address: s.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = s
            .split_once(':')
            .ok_or_else(|| malformed("missing scheme separator"))?;

        // Canonical form first: `10.0.0.1:830` or `[::1]:830`.
        if let Ok(endpoint) = rest.parse::<SocketAddr>() {
            return resolve_identity(scheme, &endpoint.ip().to_string(), endpoint.port());
        }

        // Unbracketed IPv6: the port is whatever follows the last colon.
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| malformed("missing port"))?;
        let port: u16 = port.parse().map_err(|_| malformed("port is not a number"))?;
        resolve_identity(scheme, host, port)
    }
}

impl TryFrom<String> for DeviceIdentity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceIdentity> for String {
    fn from(id: DeviceIdentity) -> Self {
        id.to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
