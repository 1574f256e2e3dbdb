use std::fmt::Display;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::helpers::NonEmpty;

pub const UPGRADE_PATH: &str = "upgrade";
pub const API_VERSION_PATH: &str = "v1";
pub const HEALTH_PATH: &str = "healthz";

/// Longest deadline a caller may ask for, requests above it are rejected.
pub const MAX_TIMEOUT_SECONDS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    ControlPlane,
    #[default]
    Worker,
}

impl Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::ControlPlane => f.write_str("control-plane"),
            NodeRole::Worker => f.write_str("worker"),
        }
    }
}

/// Body of a single upgrade call sent to the node agent.
///
/// Empty version strings skip the corresponding step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(default, setter(into))]
pub struct UpgradeRequest {
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub os_image_url: String,
    #[serde(default)]
    pub kube_version: String,
    pub node_role: NodeRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(setter(into, strip_option))]
    pub timeout_seconds: Option<u64>,
}

impl UpgradeRequest {
    pub fn os_target(&self) -> Option<&str> {
        self.os_version.non_empty()
    }

    pub fn kube_target(&self) -> Option<&str> {
        self.kube_version.non_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeResponse {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    VersionParseError,
    InvalidRequest,
    ExternalCommandError,
    DeadlineExceeded,
    StampAccessError,
    OsReleaseError,
    BootIdError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
