use housekeeper_core::{
    helpers::AndIf,
    kubernetes::operations::apply_resource,
    resources::{
        crd::v1alpha1::update::{Update, UpdateSpec},
        labels::get_housekeeper_labels,
    },
};
use kube::{api::PatchParams, Client};
use log::{debug, info};

use crate::{
    cli::{CreateUpdateArgs, GlobalArgs},
    CLI_FIELD_MANAGER,
};

pub async fn create_update(
    global_args: &GlobalArgs,
    args: &CreateUpdateArgs,
    client: &Client,
) -> anyhow::Result<()> {
    let update = build_update(global_args, args)?;

    debug!("{update:#?}");

    let apply_params = PatchParams::apply(CLI_FIELD_MANAGER)
        .force()
        .and_if(args.dry_run, |p| p.dry_run());

    apply_resource(client, &update, &apply_params).await?;

    info!(
        "Update '{}' created, nodes labeled 'upgrading' will pick it up",
        args.name
    );

    Ok(())
}

fn build_update(global_args: &GlobalArgs, args: &CreateUpdateArgs) -> anyhow::Result<Update> {
    let spec = UpdateSpec {
        os_version: args.os_version.clone(),
        os_image_url: args.os_image_url.clone(),
        kube_version: args.kube_version.clone(),
        evict_pod_force: args.evict_pod_force,
        node_name: args.node_name.clone(),
    };

    spec.validate()?;

    let mut update = Update::new(&args.name, spec);
    update.metadata.namespace = Some(global_args.namespace.clone());
    update.metadata.labels = Some(get_housekeeper_labels());

    Ok(update)
}
