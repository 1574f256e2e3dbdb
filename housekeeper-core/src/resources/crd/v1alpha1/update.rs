use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    helpers::NonEmpty,
    version::{parse_version, VersionParseError},
};

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "housekeeper.io",
    version = "v1alpha1",
    kind = "Update",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSpec {
    /// desired operating system version, compared against the version reported by the node
    pub os_version: Option<String>,
    /// OS image reference the node is rebased onto, required when osVersion is set
    pub os_image_url: Option<String>,
    /// desired kubernetes version, applied once per node with kubeadm
    pub kube_version: Option<String>,
    /// evict pods that are not managed by any controller when draining
    #[serde(default)]
    pub evict_pod_force: bool,
    /// restricts this update to a single node, every signaled node acts on it when unset
    pub node_name: Option<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum UpdateValidationError {
    #[error("Update requests neither an OS nor a kubernetes version!")]
    NoTarget,
    #[error("osImageUrl is required when osVersion is set!")]
    MissingOsImage,
    #[error("Invalid osVersion! {}", .0)]
    InvalidOsVersion(VersionParseError),
    #[error("Invalid kubeVersion! {}", .0)]
    InvalidKubeVersion(VersionParseError),
}

impl UpdateSpec {
    pub fn os_target(&self) -> Option<&str> {
        self.os_version.non_empty()
    }

    pub fn os_image(&self) -> Option<&str> {
        self.os_image_url.non_empty()
    }

    pub fn kube_target(&self) -> Option<&str> {
        self.kube_version.non_empty()
    }

    pub fn targets_node(&self, node_name: &str) -> bool {
        match self.node_name.non_empty() {
            Some(target) => target == node_name,
            None => true,
        }
    }

    pub fn validate(&self) -> Result<(), UpdateValidationError> {
        if self.os_target().is_none() && self.kube_target().is_none() {
            return Err(UpdateValidationError::NoTarget);
        }

        if let Some(os_version) = self.os_target() {
            if self.os_image().is_none() {
                return Err(UpdateValidationError::MissingOsImage);
            }

            parse_version(os_version).map_err(UpdateValidationError::InvalidOsVersion)?;
        }

        if let Some(kube_version) = self.kube_target() {
            parse_version(kube_version).map_err(UpdateValidationError::InvalidKubeVersion)?;
        }

        Ok(())
    }
}
