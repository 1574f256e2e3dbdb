use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    api::{DeleteParams, PatchParams},
    Client, CustomResourceExt,
};

use crate::{
    helpers::AndIf,
    kubernetes::operations::{apply_crd, try_remove_cluster_resource},
};

use self::update::Update;

pub mod update;

pub async fn create_v1alpha1_crds(
    client: &Client,
    apply_params: &PatchParams,
) -> anyhow::Result<()> {
    apply_crd(client, &Update::crd(), apply_params).await?;

    Ok(())
}

pub async fn remove_v1alpha1_crds(client: &Client, dry_run: bool) -> anyhow::Result<()> {
    let delete_params = DeleteParams::foreground().and_if(dry_run, |p| p.dry_run());

    try_remove_cluster_resource::<CustomResourceDefinition>(
        client,
        Update::crd_name(),
        &delete_params,
    )
    .await?;

    Ok(())
}
