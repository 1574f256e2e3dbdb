use anyhow::anyhow;
use housekeeper_core::{
    helpers::AndIf,
    kubernetes::operations::{
        apply_cluster_resource, apply_resource, check_if_resource_exists,
        create_namespace_if_not_exists,
    },
    resources::{
        crd::v1alpha1::create_v1alpha1_crds,
        labels::get_housekeeper_listparams,
        release::{Release, ReleaseBuilder},
    },
};
use k8s_openapi::api::apps::v1::DaemonSet;
use kube::{api::PatchParams, Api, Client};
use log::{debug, info, warn};

use crate::{
    cli::{GlobalArgs, InstallArgs},
    CLI_FIELD_MANAGER,
};

pub async fn install(
    global_args: &GlobalArgs,
    args: &InstallArgs,
    client: &Client,
) -> anyhow::Result<()> {
    info!(
        "Installing housekeeper into '{}' namespace...",
        global_args.namespace
    );

    debug!("Checking if housekeeper is already installed...");
    if check_if_release_exists(&global_args.namespace, client).await? {
        if args.force {
            warn!(
                "housekeeper is already installed in the namespace '{}', force deploying...",
                global_args.namespace
            );
        } else {
            return Err(anyhow!(
                "housekeeper is already installed in the namespace '{}'!",
                global_args.namespace
            ));
        }
    }

    let release = prepare_release(global_args, args)?;
    let apply_params = PatchParams::apply(CLI_FIELD_MANAGER)
        .force()
        .and_if(args.dry_run, |p| p.dry_run());

    create_v1alpha1_crds(client, &apply_params).await?;
    deploy_release(&release, client, &apply_params).await?;

    info!("Successfully deployed housekeeper!");

    Ok(())
}

async fn check_if_release_exists(namespace: &str, client: &Client) -> anyhow::Result<bool> {
    check_if_resource_exists::<DaemonSet>(
        &get_housekeeper_listparams(),
        &Api::namespaced(client.clone(), namespace),
    )
    .await
}

fn prepare_release(global_args: &GlobalArgs, args: &InstallArgs) -> anyhow::Result<Release> {
    let release = ReleaseBuilder::default()
        .namespace({
            info!("Using release namespace: {}", global_args.namespace);
            global_args.namespace.as_str()
        })
        .daemon_image_name({
            info!("Using daemon image: {}", args.daemon_image);
            args.daemon_image.as_str()
        })
        .operator_image_name({
            info!("Using operator image: {}", args.operator_image);
            args.operator_image.as_str()
        })
        .build()?;

    debug!("{release:#?}");

    Ok(release)
}

async fn deploy_release(
    release: &Release,
    client: &Client,
    apply_params: &PatchParams,
) -> anyhow::Result<()> {
    let service_account = release.generate_service_account();
    let cluster_role = release.generate_cluster_role();
    let cluster_role_binding = release.generate_cluster_role_binding(&cluster_role, &service_account);
    let daemonset = release.generate_daemonset(&service_account);

    debug!("{service_account:#?}");
    debug!("{cluster_role:#?}");
    debug!("{cluster_role_binding:#?}");
    debug!("{daemonset:#?}");

    create_namespace_if_not_exists(client, apply_params, &release.namespace).await?;
    apply_resource(client, &service_account, apply_params).await?;
    apply_cluster_resource(client, &cluster_role, apply_params).await?;
    apply_cluster_resource(client, &cluster_role_binding, apply_params).await?;
    apply_resource(client, &daemonset, apply_params).await?;

    Ok(())
}
