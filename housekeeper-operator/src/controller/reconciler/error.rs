use housekeeper_core::{
    resources::crd::v1alpha1::update::UpdateValidationError, stamp::StampError,
};
use thiserror::Error;

use crate::{agent_client::AgentClientError, drain::DrainError};

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Object is missing metadata!")]
    MissingObjectMetadata,
    #[error("'{}' resource contains invalid data! {}", .0, .1)]
    InvalidObjectData(String, UpdateValidationError),
    #[error("Couldn't access the node! Reason: {}", .0)]
    KubeApiError(kube::Error),
    #[error("Couldn't check the upgrade stamp! Reason: {}", .0)]
    StampAccessError(StampError),
    #[error("Couldn't drain the node! Reason: {}", .0)]
    DrainError(DrainError),
    #[error("Upgrade call failed! Reason: {}", .0)]
    AgentError(AgentClientError),
}
