use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;

use crate::protocol::NodeRole;

/// Presence of this label on a node is the signal that it may be drained and upgraded.
pub const LABEL_UPGRADING: &str = "upgrading";

pub const LABEL_ROLE_CONTROL_PLANE: &str = "node-role.kubernetes.io/control-plane";
pub const LABEL_ROLE_MASTER: &str = "node-role.kubernetes.io/master";

pub fn is_signaled(node: &Node) -> bool {
    node.metadata
        .labels
        .as_ref()
        .is_some_and(|labels| labels.contains_key(LABEL_UPGRADING))
}

pub fn get_node_role(node: &Node) -> NodeRole {
    let is_control_plane = node.metadata.labels.as_ref().is_some_and(|labels| {
        labels.contains_key(LABEL_ROLE_CONTROL_PLANE) || labels.contains_key(LABEL_ROLE_MASTER)
    });

    match is_control_plane {
        true => NodeRole::ControlPlane,
        false => NodeRole::Worker,
    }
}

pub fn get_housekeeper_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_owned(), "housekeeper".to_owned()),
        ("app.kubernetes.io/component".to_owned(), "node-upgrader".to_owned()),
        ("app.kubernetes.io/managed-by".to_owned(), "housekeeper-cli".to_owned()),
    ])
}

pub fn get_joined_housekeeper_labels() -> String {
    get_housekeeper_labels()
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn get_housekeeper_listparams() -> ListParams {
    ListParams::default().labels(&get_joined_housekeeper_labels())
}
