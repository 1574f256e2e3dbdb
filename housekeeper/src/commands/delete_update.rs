use housekeeper_core::{
    helpers::AndIf, kubernetes::operations::try_remove_resource,
    resources::crd::v1alpha1::update::Update,
};
use kube::{api::DeleteParams, Client};

use crate::cli::{DeleteUpdateArgs, GlobalArgs};

pub async fn delete_update(
    global_args: &GlobalArgs,
    args: &DeleteUpdateArgs,
    client: &Client,
) -> anyhow::Result<()> {
    let delete_params = DeleteParams::default().and_if(args.dry_run, |p| p.dry_run());

    try_remove_resource::<Update>(client, &args.name, &global_args.namespace, &delete_params)
        .await
}
