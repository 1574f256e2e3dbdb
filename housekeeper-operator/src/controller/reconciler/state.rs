use k8s_openapi::api::core::v1::Node;
use housekeeper_core::{
    resources::crd::v1alpha1::update::UpdateSpec,
    stamp::{StampError, StampStore},
};

/// Where a node stands relative to an `Update`, derived fresh on every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// drain, then hand over to the agent
    NeedsUpgradeSignaled,
    /// waiting for the `upgrading` label
    NeedsUpgradeUnsignaled,
    UpToDateCordoned,
    UpToDateSchedulable,
}

impl NodeState {
    pub fn new(upgrade_due: bool, signaled: bool, unschedulable: bool) -> Self {
        match (upgrade_due, signaled, unschedulable) {
            (true, true, _) => NodeState::NeedsUpgradeSignaled,
            (true, false, _) => NodeState::NeedsUpgradeUnsignaled,
            (false, _, true) => NodeState::UpToDateCordoned,
            (false, _, false) => NodeState::UpToDateSchedulable,
        }
    }
}

/// The OS image string the kubelet reports for the node.
pub fn reported_os_version(node: &Node) -> Option<&str> {
    node.status
        .as_ref()
        .and_then(|status| status.node_info.as_ref())
        .map(|info| info.os_image.as_str())
}

/// A kubernetes target is due until the agent stamped it. Without one, the OS target is due
/// whenever the reported version string differs.
pub async fn is_upgrade_due(
    spec: &UpdateSpec,
    node: &Node,
    stamps: &StampStore,
) -> Result<bool, StampError> {
    if let Some(kube_version) = spec.kube_target() {
        return Ok(!stamps.has_kube_stamp(kube_version).await?);
    }

    Ok(match spec.os_target() {
        Some(os_version) => reported_os_version(node) != Some(os_version),
        None => false,
    })
}
