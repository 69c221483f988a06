//! Mastership roles.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identity::DeviceIdentity;

/// Role this cluster node holds for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MastershipRole {
    /// This node owns the device and may connect to it.
    Master,
    /// Another node owns the device; this node is a backup.
    Standby,
    /// This node has no role for the device.
    None,
}

impl MastershipRole {
    pub fn is_master(self) -> bool {
        self == MastershipRole::Master
    }
}

impl fmt::Display for MastershipRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MastershipRole::Master => "MASTER",
            MastershipRole::Standby => "STANDBY",
            MastershipRole::None => "NONE",
        };
        f.write_str(s)
    }
}

/// A role change delivered for one device.  Consumed once; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    pub identity: DeviceIdentity,
    pub role: MastershipRole,
}

impl RoleAssignment {
    pub fn new(identity: DeviceIdentity, role: MastershipRole) -> Self {
        Self { identity, role }
    }
}

/// Identifier of a cluster node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
