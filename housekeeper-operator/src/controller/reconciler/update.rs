use std::{sync::Arc, time::Duration};

use housekeeper_core::{
    helpers::RequireMetadata,
    protocol::UpgradeRequest,
    resources::{
        crd::v1alpha1::update::{Update, UpdateSpec},
        labels::{get_node_role, is_signaled, LABEL_UPGRADING},
    },
};
use k8s_openapi::api::core::v1::Node;
use kube::{
    api::{Patch, PatchParams},
    runtime::controller::Action,
    ResourceExt,
};
use log::{debug, info, warn};
use serde_json::json;

use crate::drain::{drain_node, is_unschedulable, uncordon, DrainOptions};

use super::{
    context::ReconcilerContext,
    error::ReconcilerError,
    state::{is_upgrade_due, reported_os_version, NodeState},
};

const ERROR_REQUEUE_SECS: u64 = 1;

pub async fn reconcile_update(
    object: Arc<Update>,
    context: Arc<ReconcilerContext>,
) -> Result<Action, ReconcilerError> {
    try_reconcile(&object, &context).await?;

    Ok(Action::requeue(context.config.reconcile_interval))
}

pub fn reconcile_update_error(
    _object: Arc<Update>,
    error: &ReconcilerError,
    context: Arc<ReconcilerContext>,
) -> Action {
    Action::requeue(match error {
        // retrying won't help until someone edits the record
        ReconcilerError::InvalidObjectData(..) => context.config.reconcile_interval,
        _ => Duration::from_secs(ERROR_REQUEUE_SECS),
    })
}

async fn try_reconcile(
    object: &Update,
    context: &ReconcilerContext,
) -> Result<(), ReconcilerError> {
    let name = object.require_name_or(ReconcilerError::MissingObjectMetadata)?;
    let node_name = context.config.node_name.as_str();

    if !object.spec.targets_node(node_name) {
        debug!("Update '{name}' doesn't target node '{node_name}'");
        return Ok(());
    }

    object
        .spec
        .validate()
        .map_err(|err| ReconcilerError::InvalidObjectData(name.to_owned(), err))?;

    let node = context
        .node_api()
        .get(node_name)
        .await
        .map_err(ReconcilerError::KubeApiError)?;

    let upgrade_due = is_upgrade_due(&object.spec, &node, &context.stamps)
        .await
        .map_err(ReconcilerError::StampAccessError)?;
    let state = NodeState::new(upgrade_due, is_signaled(&node), is_unschedulable(&node));

    debug!(
        "Node '{node_name}' (OS '{}') is {state:?} for update '{name}'",
        reported_os_version(&node).unwrap_or_default()
    );

    match state {
        NodeState::NeedsUpgradeSignaled => upgrade_node(&object.spec, &node, context).await,
        NodeState::NeedsUpgradeUnsignaled => {
            info!("Node '{node_name}' needs an upgrade, waiting for the '{LABEL_UPGRADING}' label");
            Ok(())
        }
        NodeState::UpToDateCordoned | NodeState::UpToDateSchedulable => {
            restore_node(&node, context).await
        }
    }
}

async fn upgrade_node(
    spec: &UpdateSpec,
    node: &Node,
    context: &ReconcilerContext,
) -> Result<(), ReconcilerError> {
    let node_name = node.name_any();

    info!("Draining node '{node_name}'...");

    drain_node(
        &context.client,
        node,
        DrainOptions {
            force: spec.evict_pod_force,
            timeout: context.config.drain_timeout,
        },
    )
    .await
    .map_err(ReconcilerError::DrainError)?;

    let request = UpgradeRequest {
        os_version: spec.os_target().unwrap_or_default().to_owned(),
        os_image_url: spec.os_image().unwrap_or_default().to_owned(),
        kube_version: spec.kube_target().unwrap_or_default().to_owned(),
        node_role: get_node_role(node),
        timeout_seconds: Some(context.config.upgrade_timeout.as_secs()),
    };

    info!(
        "Upgrading {} node '{node_name}' (os: '{}', kube: '{}')...",
        request.node_role, request.os_version, request.kube_version
    );

    context
        .agent
        .upgrade(&request)
        .await
        .map_err(ReconcilerError::AgentError)?;

    info!("Node agent accepted the upgrade of '{node_name}', it stays cordoned until it's up to date");

    Ok(())
}

async fn restore_node(node: &Node, context: &ReconcilerContext) -> Result<(), ReconcilerError> {
    let node_name = node.name_any();

    if is_signaled(node) {
        match remove_upgrading_label(&node_name, context).await {
            Ok(_) => info!("Removed '{LABEL_UPGRADING}' label from node '{node_name}'"),
            Err(err) => warn!("Couldn't remove '{LABEL_UPGRADING}' label from node '{node_name}'! {err}"),
        }
    }

    if uncordon(&context.client, node)
        .await
        .map_err(ReconcilerError::DrainError)?
    {
        info!("Uncordoned node '{node_name}'");
    }

    Ok(())
}

async fn remove_upgrading_label(
    node_name: &str,
    context: &ReconcilerContext,
) -> Result<Node, kube::Error> {
    let patch = json!({
        "metadata": {
            "labels": {
                LABEL_UPGRADING: null
            }
        }
    });

    context
        .node_api()
        .patch(node_name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
}
