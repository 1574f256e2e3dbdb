use std::{convert::Infallible, sync::Arc};

use housekeeper_core::protocol::{
    ErrorKind, ErrorResponse, UpgradeRequest, UpgradeResponse, API_VERSION_PATH, HEALTH_PATH,
    UPGRADE_PATH,
};
use log::{error, info};
use warp::{
    http::StatusCode,
    reply::{json, with_status, Json, WithStatus},
    Filter, Rejection, Reply,
};

use crate::executor::{error::UpgradeError, UpgradeExecutor};

const MAX_REQUEST_BYTES: u64 = 16 * 1024;

pub fn routes(
    executor: Arc<UpgradeExecutor>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let upgrade = warp::post()
        .and(warp::path(API_VERSION_PATH))
        .and(warp::path(UPGRADE_PATH))
        .and(warp::path::end())
        .and(warp::body::content_length_limit(MAX_REQUEST_BYTES))
        .and(warp::body::json())
        .and(with_executor(executor))
        .and_then(handle_upgrade);

    let health = warp::get()
        .and(warp::path(HEALTH_PATH))
        .and(warp::path::end())
        .map(|| "ok");

    upgrade.or(health)
}

fn with_executor(
    executor: Arc<UpgradeExecutor>,
) -> impl Filter<Extract = (Arc<UpgradeExecutor>,), Error = Infallible> + Clone {
    warp::any().map(move || executor.clone())
}

async fn handle_upgrade(
    request: UpgradeRequest,
    executor: Arc<UpgradeExecutor>,
) -> Result<WithStatus<Json>, Infallible> {
    info!(
        "Received upgrade request (os: '{}', kube: '{}', role: {})",
        request.os_version, request.kube_version, request.node_role
    );

    match executor.apply(&request).await {
        Ok(outcome) => {
            info!("Upgrade request finished: {outcome:?}");
            Ok(with_status(json(&UpgradeResponse {}), StatusCode::OK))
        }
        Err(err) => {
            error!("Upgrade request failed! {err}");
            Ok(error_reply(&err))
        }
    }
}

fn error_reply(err: &UpgradeError) -> WithStatus<Json> {
    let kind = err.kind();
    let status = match kind {
        ErrorKind::VersionParseError | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    with_status(
        json(&ErrorResponse {
            kind,
            message: err.to_string(),
        }),
        status,
    )
}
