use housekeeper_core::{
    kubernetes::operations::list_resources, resources::crd::v1alpha1::update::Update,
};
use kube::{api::ListParams, Client};
use serde::Serialize;

use crate::{
    cli::{GlobalArgs, ListUpdatesArgs},
    output::{CliPrint, TableCellOption, TableOutputRow},
};

pub async fn list_updates(
    global_args: &GlobalArgs,
    args: &ListUpdatesArgs,
    client: &Client,
) -> anyhow::Result<()> {
    let updates =
        list_resources::<Update>(client, &global_args.namespace, &ListParams::default()).await?;
    let update_views = updates.iter().map(|u| u.into()).collect::<Vec<UpdateView>>();

    update_views.print(args.output)?;

    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateView<'a> {
    pub name: TableCellOption<&'a str>,
    pub os_version: TableCellOption<&'a str>,
    pub os_image_url: TableCellOption<&'a str>,
    pub kube_version: TableCellOption<&'a str>,
    pub evict_pod_force: bool,
    pub node_name: TableCellOption<&'a str>,
}

impl<'a> From<&'a Update> for UpdateView<'a> {
    fn from(value: &'a Update) -> Self {
        UpdateView {
            name: value.metadata.name.as_deref().into(),
            os_version: value.spec.os_target().into(),
            os_image_url: value.spec.os_image().into(),
            kube_version: value.spec.kube_target().into(),
            evict_pod_force: value.spec.evict_pod_force,
            node_name: value.spec.node_name.as_deref().into(),
        }
    }
}

impl TableOutputRow for UpdateView<'_> {
    fn name(&self) -> String {
        self.name.to_string()
    }

    fn header() -> Vec<&'static str> {
        vec![
            "name",
            "os version",
            "os image",
            "kube version",
            "force",
            "node",
        ]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.name.to_string(),
            self.os_version.to_string(),
            self.os_image_url.to_string(),
            self.kube_version.to_string(),
            self.evict_pod_force.to_string(),
            self.node_name.to_string(),
        ]
    }
}
