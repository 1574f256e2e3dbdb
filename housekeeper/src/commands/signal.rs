use housekeeper_core::{helpers::AndIf, resources::labels::LABEL_UPGRADING};
use k8s_openapi::api::core::v1::Node;
use kube::{
    api::{Patch, PatchParams},
    Api, Client,
};
use log::info;
use serde_json::{json, Value};

use crate::cli::SignalArgs;

pub async fn signal(args: &SignalArgs, client: &Client) -> anyhow::Result<()> {
    patch_signal(args, client, json!("true")).await?;

    info!("Node '{}' may now be drained and upgraded", args.node);

    Ok(())
}

pub async fn unsignal(args: &SignalArgs, client: &Client) -> anyhow::Result<()> {
    patch_signal(args, client, Value::Null).await?;

    info!("Removed the upgrade signal from node '{}'", args.node);

    Ok(())
}

async fn patch_signal(args: &SignalArgs, client: &Client, value: Value) -> anyhow::Result<()> {
    let patch = json!({
        "metadata": {
            "labels": {
                LABEL_UPGRADING: value
            }
        }
    });
    let patch_params = PatchParams::default().and_if(args.dry_run, |p| p.dry_run());

    Api::<Node>::all(client.clone())
        .patch(&args.node, &patch_params, &Patch::Merge(&patch))
        .await?;

    Ok(())
}
