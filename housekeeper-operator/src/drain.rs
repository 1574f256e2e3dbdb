//! Cordoning and evicting workloads off a node, in the spirit of `kubectl drain`.
//!
//! Evictions go through the eviction subresource so PodDisruptionBudgets are respected.
//! DaemonSet pods, static mirror pods and system-critical pods are left in place.
use std::time::Duration;

use futures::{stream, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::{
    api::{EvictParams, ListParams},
    Api, Client, ResourceExt,
};
use log::{debug, info, warn};
use thiserror::Error;
use tokio::time::sleep;

const CONCURRENT_EVICTIONS: usize = 5;
const EVICTION_RETRY_INTERVAL: Duration = Duration::from_secs(5);
const DELETION_CHECK_INTERVAL: Duration = Duration::from_secs(5);

const MIRROR_POD_ANNOTATION: &str = "kubernetes.io/config.mirror";
const CRITICAL_PRIORITY_CLASSES: [&str; 2] = ["system-node-critical", "system-cluster-critical"];

#[derive(Debug, Error)]
pub enum DrainError {
    #[error("Couldn't change schedulability of node '{}'! Reason: {}", .0, .1)]
    Schedulability(String, kube::Error),
    #[error("Couldn't list pods on node '{}'! Reason: {}", .0, .1)]
    ListPods(String, kube::Error),
    #[error("Pods without a controller block the drain, set evictPodForce to evict them: {}", .0.join(", "))]
    UnmanagedPods(Vec<String>),
    #[error("Couldn't evict pod '{}'! Reason: {}", .0, .1)]
    Eviction(String, kube::Error),
    #[error("Node '{}' wasn't drained within {}s!", .0, .1.as_secs())]
    Timeout(String, Duration),
}

#[derive(Debug, Clone, Copy)]
pub struct DrainOptions {
    /// evict pods that no controller would recreate
    pub force: bool,
    pub timeout: Duration,
}

pub fn is_unschedulable(node: &Node) -> bool {
    node.spec
        .as_ref()
        .and_then(|spec| spec.unschedulable)
        .unwrap_or(false)
}

/// Marks the node unschedulable, returns false when it already was.
pub async fn cordon(client: &Client, node: &Node) -> Result<bool, DrainError> {
    set_unschedulable(client, node, true).await
}

/// Marks the node schedulable again, returns false when it already was.
pub async fn uncordon(client: &Client, node: &Node) -> Result<bool, DrainError> {
    set_unschedulable(client, node, false).await
}

async fn set_unschedulable(
    client: &Client,
    node: &Node,
    unschedulable: bool,
) -> Result<bool, DrainError> {
    if is_unschedulable(node) == unschedulable {
        return Ok(false);
    }

    let api = Api::<Node>::all(client.clone());
    let name = node.name_any();
    let result = match unschedulable {
        true => api.cordon(&name).await,
        false => api.uncordon(&name).await,
    };

    result.map_err(|err| DrainError::Schedulability(name, err))?;

    Ok(true)
}

/// Cordons the node, then evicts its pods and waits for them to go away.
pub async fn drain_node(
    client: &Client,
    node: &Node,
    options: DrainOptions,
) -> Result<(), DrainError> {
    let node_name = node.name_any();

    if cordon(client, node).await? {
        info!("Cordoned node '{node_name}'");
    }

    match tokio::time::timeout(options.timeout, evict_all(client, &node_name, options.force)).await
    {
        Ok(result) => result,
        Err(_) => Err(DrainError::Timeout(node_name, options.timeout)),
    }
}

async fn evict_all(client: &Client, node_name: &str, force: bool) -> Result<(), DrainError> {
    let pods = Api::<Pod>::all(client.clone())
        .list(&ListParams::default().fields(&format!("spec.nodeName={node_name}")))
        .await
        .map_err(|err| DrainError::ListPods(node_name.to_owned(), err))?;

    let targets = select_evictions(pods.items, force)?;

    info!("Evicting {} pod(s) from node '{node_name}'...", targets.len());

    stream::iter(targets)
        .map(|pod| evict_and_wait(client, pod))
        .buffer_unordered(CONCURRENT_EVICTIONS)
        .try_collect::<Vec<_>>()
        .await?;

    info!("Node '{node_name}' drained");

    Ok(())
}

/// Picks the pods a drain has to evict, failing on unmanaged pods unless forced.
pub fn select_evictions(pods: Vec<Pod>, force: bool) -> Result<Vec<Pod>, DrainError> {
    let mut targets = Vec::new();
    let mut unmanaged = Vec::new();

    for pod in pods {
        if is_completed(&pod) {
            targets.push(pod);
            continue;
        }

        if is_daemonset_pod(&pod) || is_mirror_pod(&pod) || is_critical_pod(&pod) {
            debug!("Not evicting pod '{}'", pretty_pod_name(&pod));
            continue;
        }

        if !has_controller(&pod) {
            match force {
                true => warn!(
                    "Force evicting pod '{}' without a controller",
                    pretty_pod_name(&pod)
                ),
                false => {
                    unmanaged.push(pretty_pod_name(&pod));
                    continue;
                }
            }
        }

        targets.push(pod);
    }

    match unmanaged.is_empty() {
        true => Ok(targets),
        false => Err(DrainError::UnmanagedPods(unmanaged)),
    }
}

async fn evict_and_wait(client: &Client, pod: Pod) -> Result<(), DrainError> {
    let api = namespaced_pod_api(client, &pod);
    let name = pod.name_any();

    loop {
        match api.evict(&name, &EvictParams::default()).await {
            Ok(_) => {
                info!("Evicted pod '{}'", pretty_pod_name(&pod));
                break;
            }
            Err(kube::Error::Api(response)) if response.code == 404 => return Ok(()),
            Err(kube::Error::Api(response)) if should_retry_eviction(response.code) => {
                warn!(
                    "Eviction of pod '{}' was refused ({}), retrying in {}s...",
                    pretty_pod_name(&pod),
                    response.message,
                    EVICTION_RETRY_INTERVAL.as_secs()
                );
                sleep(EVICTION_RETRY_INTERVAL).await;
            }
            Err(err) => return Err(DrainError::Eviction(pretty_pod_name(&pod), err)),
        }
    }

    wait_for_deletion(&api, &pod).await;

    Ok(())
}

async fn wait_for_deletion(api: &Api<Pod>, pod: &Pod) {
    let name = pod.name_any();

    loop {
        match api.get_opt(&name).await {
            Ok(None) => break,
            // same name, different pod: the original one is gone
            Ok(Some(current)) if current.uid() != pod.uid() => break,
            Ok(Some(_)) => debug!("Pod '{}' not deleted yet", pretty_pod_name(pod)),
            Err(err) => warn!(
                "Couldn't check whether pod '{}' was deleted! {err}",
                pretty_pod_name(pod)
            ),
        }

        sleep(DELETION_CHECK_INTERVAL).await;
    }
}

/// Disruption budgets answer 429 until they allow the eviction, misconfigured ones answer 500.
fn should_retry_eviction(code: u16) -> bool {
    code == 429 || code == 500
}

fn namespaced_pod_api(client: &Client, pod: &Pod) -> Api<Pod> {
    match pod.metadata.namespace.as_deref() {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::default_namespaced(client.clone()),
    }
}

fn pretty_pod_name(pod: &Pod) -> String {
    format!(
        "{}/{}",
        pod.metadata.namespace.as_deref().unwrap_or("---"),
        pod.name_any()
    )
}

fn is_completed(pod: &Pod) -> bool {
    matches!(
        pod.status.as_ref().and_then(|status| status.phase.as_deref()),
        Some("Succeeded") | Some("Failed")
    )
}

fn is_daemonset_pod(pod: &Pod) -> bool {
    pod.owner_references()
        .iter()
        .any(|owner| owner.controller == Some(true) && owner.kind == "DaemonSet")
}

fn is_mirror_pod(pod: &Pod) -> bool {
    pod.annotations().contains_key(MIRROR_POD_ANNOTATION)
}

fn is_critical_pod(pod: &Pod) -> bool {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.priority_class_name.as_deref())
        .is_some_and(|class| CRITICAL_PRIORITY_CLASSES.contains(&class))
}

fn has_controller(pod: &Pod) -> bool {
    pod.owner_references()
        .iter()
        .any(|owner| owner.controller == Some(true))
}
