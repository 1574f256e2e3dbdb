use std::sync::Arc;

use futures::StreamExt;
use housekeeper_core::resources::crd::v1alpha1::update::Update;
use k8s_openapi::api::core::v1::Node;
use kube::{
    runtime::{
        controller::{Action, Error as ControllerError},
        reflector::ObjectRef,
        watcher::{Config, Error as WatcherError},
        Controller,
    },
    Api, Resource,
};
use log::{info, log, Level};

use self::reconciler::{
    context::ReconcilerContext,
    error::ReconcilerError,
    update::{reconcile_update, reconcile_update_error},
};

pub mod reconciler;

type ReconciliationResult =
    Result<(ObjectRef<Update>, Action), ControllerError<ReconcilerError, WatcherError>>;

/// Reconciles every `Update` against this operator's node, re-running all of them whenever
/// the node itself changes.
pub async fn start_update_controller(context: Arc<ReconcilerContext>) {
    let node_name = context.config.node_name.clone();

    info!("Creating update controller for node '{node_name}'...");

    let node_config = Config::default().fields(&format!("metadata.name={node_name}"));
    let controller = Controller::new(Api::<Update>::all(context.client.clone()), Config::default());
    let updates = controller.store();

    controller
        .watches(context.node_api(), node_config, move |_: Node| {
            updates
                .state()
                .into_iter()
                .map(|update| ObjectRef::from_obj(update.as_ref()))
                .collect::<Vec<_>>()
        })
        .shutdown_on_signal()
        .run(reconcile_update, reconcile_update_error, context)
        .for_each(|result| {
            if let Some((level, message)) = describe_result(&node_name, &result) {
                log!(level, "{message}");
            }

            std::future::ready(())
        })
        .await;

    info!("Update controller for node '{node_name}' stopped");
}

fn describe_result(node_name: &str, result: &ReconciliationResult) -> Option<(Level, String)> {
    match result {
        Ok((update, action)) => Some((
            Level::Info,
            format!(
                "Checked update '{}' against node '{node_name}'. Next action: {action:?}",
                pretty_ref(update)
            ),
        )),
        // deleted, nothing left to do
        Err(ControllerError::ObjectNotFound(_)) => None,
        Err(ControllerError::ReconcilerFailed(err, update)) => {
            let level = match err {
                ReconcilerError::InvalidObjectData(..) => Level::Warn,
                _ => Level::Error,
            };

            Some((
                level,
                format!(
                    "Update '{}' failed on node '{node_name}'! {err}",
                    pretty_ref(update)
                ),
            ))
        }
        Err(ControllerError::QueueError(err)) => Some((
            Level::Error,
            format!("Watcher of node '{node_name}' has failed! {err}"),
        )),
    }
}

fn pretty_ref<K: Resource>(object: &ObjectRef<K>) -> String {
    format!(
        "{}/{}",
        object.namespace.as_deref().unwrap_or("---"),
        object.name
    )
}
