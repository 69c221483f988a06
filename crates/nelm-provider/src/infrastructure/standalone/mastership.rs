//! Single-node mastership: this node is the only cluster member.

use async_trait::async_trait;
use dashmap::DashMap;
use nelm_core::{DeviceIdentity, MastershipRole, NodeId};
use tracing::debug;

use crate::application::collaborators::MastershipService;

/// Mastership service for a one-node cluster.
///
/// Devices have no master until [`claim`](Self::claim) assigns this node.
/// Accepted roles are recorded so callers can see what the provider replied.
pub struct LocalMastership {
    node: NodeId,
    masters: DashMap<DeviceIdentity, NodeId>,
    accepted: DashMap<DeviceIdentity, MastershipRole>,
}

impl LocalMastership {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            masters: DashMap::new(),
            accepted: DashMap::new(),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Makes this node master of `id`.
    pub fn claim(&self, id: &DeviceIdentity) {
        self.masters.insert(id.clone(), self.node);
    }

    /// Clears the master of `id`.
    pub fn release(&self, id: &DeviceIdentity) {
        self.masters.remove(id);
    }

    /// The role the provider last accepted for `id`.
    pub fn accepted_role(&self, id: &DeviceIdentity) -> Option<MastershipRole> {
        self.accepted.get(id).map(|r| *r.value())
    }
}

#[async_trait]
impl MastershipService for LocalMastership {
    async fn is_local_master(&self, id: &DeviceIdentity) -> bool {
        self.masters
            .get(id)
            .is_some_and(|master| *master.value() == self.node)
    }

    async fn master_for(&self, id: &DeviceIdentity) -> Option<NodeId> {
        self.masters.get(id).map(|master| *master.value())
    }

    async fn report_role_accepted(
        &self,
        id: &DeviceIdentity,
        requested: MastershipRole,
        accepted: MastershipRole,
    ) {
        debug!("{id}: requested {requested}, accepted {accepted}");
        self.accepted.insert(id.clone(), accepted);
    }
}
