use std::fmt::Debug;

use anyhow::{anyhow, Context};
use k8s_openapi::{
    api::core::v1::Namespace,
    apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
    serde::{de::DeserializeOwned, Serialize},
    ClusterResourceScope, NamespaceResourceScope,
};
use kube::{
    api::{DeleteParams, ListParams, Patch, PatchParams},
    config::{KubeConfigOptions, Kubeconfig},
    core::ObjectMeta,
    Api, Client, Config, Resource,
};
use log::{info, warn};

use crate::helpers::pretty_type_name;

pub async fn create_local_client(
    config_path: &Option<String>,
    context_name: &Option<String>,
) -> anyhow::Result<Client> {
    let config_options = KubeConfigOptions {
        context: context_name.to_owned(),
        ..Default::default()
    };

    let config = match config_path {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)?;
            Config::from_custom_kubeconfig(kubeconfig, &config_options).await?
        }
        None => Config::from_kubeconfig(&config_options).await?,
    };

    let client = Client::try_from(config)?;

    Ok(client)
}

pub async fn create_namespace_if_not_exists(
    client: &Client,
    patch_params: &PatchParams,
    name: &str,
) -> anyhow::Result<()> {
    let namespace_api: Api<Namespace> = Api::all(client.clone());
    let namespace = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            ..Default::default()
        },
        ..Default::default()
    };

    info!("Ensuring namespace '{}' is created...", name);
    namespace_api
        .patch(name, patch_params, &Patch::Apply(namespace))
        .await?;

    Ok(())
}

pub async fn check_if_resource_exists<T: Clone + DeserializeOwned + Debug>(
    list_params: &ListParams,
    api: &Api<T>,
) -> anyhow::Result<bool> {
    let matching_resources = api
        .list_metadata(list_params)
        .await
        .context("Couldn't retrieve resources from the cluster!")?;

    match matching_resources.items.len() {
        0 => Ok(false),
        1 => Ok(true),
        _ => {
            warn!("There are multiple resources matching the release! This could cause unintented behavior!");
            Ok(true)
        }
    }
}

pub async fn list_resources<T>(
    client: &Client,
    namespace: &str,
    list_params: &ListParams,
) -> anyhow::Result<Vec<T>>
where
    T: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug,
{
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    let resources = api.list(list_params).await.context(format!(
        "Couldn't list {} resources!",
        pretty_type_name::<T>()
    ))?;

    Ok(resources.items)
}

pub async fn apply_resource<T>(
    client: &Client,
    resource: &T,
    patch_params: &PatchParams,
) -> anyhow::Result<()>
where
    T: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Serialize
        + Clone
        + DeserializeOwned
        + Debug,
{
    let resource_name = require_name::<T>(resource.meta())?;
    let namespace = resource
        .meta()
        .namespace
        .as_deref()
        .ok_or_else(|| anyhow!("'{resource_name}' is missing a namespace!"))?;

    info!(
        "Applying '{resource_name}' {} resource on the cluster...",
        pretty_type_name::<T>()
    );

    let resource_api: Api<T> = Api::namespaced(client.clone(), namespace);
    resource_api
        .patch(resource_name, patch_params, &Patch::Apply(resource))
        .await
        .context(format!(
            "Unable to apply '{resource_name}' {} resource!",
            pretty_type_name::<T>()
        ))?;

    Ok(())
}

pub async fn apply_cluster_resource<T>(
    client: &Client,
    resource: &T,
    patch_params: &PatchParams,
) -> anyhow::Result<()>
where
    T: Resource<Scope = ClusterResourceScope, DynamicType = ()>
        + Serialize
        + Clone
        + DeserializeOwned
        + Debug,
{
    let resource_name = require_name::<T>(resource.meta())?;

    info!(
        "Applying '{resource_name}' {} resource on the cluster...",
        pretty_type_name::<T>()
    );

    let resource_api: Api<T> = Api::all(client.clone());
    resource_api
        .patch(resource_name, patch_params, &Patch::Apply(resource))
        .await
        .context(format!(
            "Unable to apply '{resource_name}' {} resource!",
            pretty_type_name::<T>()
        ))?;

    Ok(())
}

pub async fn apply_crd(
    client: &Client,
    crd: &CustomResourceDefinition,
    patch_params: &PatchParams,
) -> anyhow::Result<()> {
    let crd_name = crd
        .metadata
        .name
        .as_ref()
        .ok_or_else(|| anyhow!("CRD is missing a name!"))?;
    let crd_apiversions = crd
        .spec
        .versions
        .iter()
        .map(|version| version.name.as_str())
        .collect::<Vec<&str>>()
        .join(", ");

    info!("Applying {crd_name} ({crd_apiversions}) CRD...");

    let crd_api: Api<CustomResourceDefinition> = Api::all(client.clone());
    crd_api
        .patch(crd_name, patch_params, &Patch::Apply(crd))
        .await
        .context(format!(
            "Unable to apply {crd_name} ({crd_apiversions}) CRD!"
        ))?;

    Ok(())
}

pub async fn try_remove_resource<T>(
    client: &Client,
    name: &str,
    namespace: &str,
    delete_params: &DeleteParams,
) -> anyhow::Result<()>
where
    T: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug,
{
    let api: Api<T> = Api::namespaced(client.clone(), namespace);

    remove_if_exists(&api, name, delete_params).await
}

pub async fn try_remove_cluster_resource<T>(
    client: &Client,
    name: &str,
    delete_params: &DeleteParams,
) -> anyhow::Result<()>
where
    T: Resource<Scope = ClusterResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug,
{
    let api: Api<T> = Api::all(client.clone());

    remove_if_exists(&api, name, delete_params).await
}

async fn remove_if_exists<T>(
    api: &Api<T>,
    name: &str,
    delete_params: &DeleteParams,
) -> anyhow::Result<()>
where
    T: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let resource_name = pretty_type_name::<T>();

    info!("Removing '{name}' {resource_name} from the cluster...");

    match api.delete(name, delete_params).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(response)) if response.code == 404 => {
            warn!("'{name}' {resource_name} is already gone, skipping...");
            Ok(())
        }
        Err(error) => Err(error).context(format!(
            "Couldn't delete '{name}' {resource_name} from the cluster!"
        )),
    }
}

fn require_name<T>(meta: &ObjectMeta) -> anyhow::Result<&str> {
    meta.name
        .as_deref()
        .ok_or_else(|| anyhow!("{} resource is missing a name!", pretty_type_name::<T>()))
}
