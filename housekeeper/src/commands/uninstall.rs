use housekeeper_core::{
    helpers::AndIf,
    kubernetes::operations::{try_remove_cluster_resource, try_remove_resource},
    resources::{crd::v1alpha1::remove_v1alpha1_crds, release::RELEASE_NAME},
    OPERATOR_CLUSTERROLE_NAME,
};
use k8s_openapi::api::{
    apps::v1::DaemonSet,
    core::v1::{Namespace, ServiceAccount},
    rbac::v1::{ClusterRole, ClusterRoleBinding},
};
use kube::{api::DeleteParams, Client};
use log::info;

use crate::cli::{GlobalArgs, UninstallArgs};

pub async fn uninstall(
    global_args: &GlobalArgs,
    args: &UninstallArgs,
    client: &Client,
) -> anyhow::Result<()> {
    let namespace = global_args.namespace.as_str();

    info!("Uninstalling housekeeper from '{namespace}' namespace...");

    let delete_params = DeleteParams::default().and_if(args.dry_run, |p| p.dry_run());

    try_remove_resource::<DaemonSet>(client, RELEASE_NAME, namespace, &delete_params).await?;
    try_remove_resource::<ServiceAccount>(client, RELEASE_NAME, namespace, &delete_params).await?;
    try_remove_cluster_resource::<ClusterRoleBinding>(
        client,
        OPERATOR_CLUSTERROLE_NAME,
        &delete_params,
    )
    .await?;
    try_remove_cluster_resource::<ClusterRole>(client, OPERATOR_CLUSTERROLE_NAME, &delete_params)
        .await?;

    // takes every Update with it
    remove_v1alpha1_crds(client, args.dry_run).await?;

    if args.delete_namespace {
        try_remove_cluster_resource::<Namespace>(client, namespace, &delete_params).await?;
    }

    info!("Successfully removed housekeeper!");

    Ok(())
}
