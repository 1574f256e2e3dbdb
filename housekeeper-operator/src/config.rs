use std::{path::PathBuf, time::Duration};

use housekeeper_core::{protocol::MAX_TIMEOUT_SECONDS, DEFAULT_AGENT_PORT, DEFAULT_STAMP_DIRECTORY};
use thiserror::Error;

pub const NODE_NAME_ENV: &str = "NODE_NAME";
pub const AGENT_ENDPOINT_ENV: &str = "HOUSEKEEPER_AGENT_ENDPOINT";
pub const STAMP_DIRECTORY_ENV: &str = "HOUSEKEEPER_STAMP_DIR";
pub const RECONCILE_INTERVAL_ENV: &str = "HOUSEKEEPER_RECONCILE_INTERVAL_SECS";
pub const DRAIN_TIMEOUT_ENV: &str = "HOUSEKEEPER_DRAIN_TIMEOUT_SECS";
pub const UPGRADE_TIMEOUT_ENV: &str = "HOUSEKEEPER_UPGRADE_TIMEOUT_SECS";

const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;
const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 10 * 60;
const DEFAULT_UPGRADE_TIMEOUT_SECS: u64 = 30 * 60;

#[derive(Debug, Error)]
pub enum FromEnvError {
    #[error("Missing {} env variable!", .0)]
    MissingVariable(&'static str),
    #[error("{} has an invalid value '{}'!", .0, .1)]
    InvalidValue(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub node_name: String,
    pub agent_endpoint: String,
    pub stamp_directory: PathBuf,
    pub reconcile_interval: Duration,
    pub drain_timeout: Duration,
    /// sent to the agent as the per-request deadline
    pub upgrade_timeout: Duration,
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self, FromEnvError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, FromEnvError> {
        let node_name = lookup(NODE_NAME_ENV)
            .filter(|name| !name.trim().is_empty())
            .ok_or(FromEnvError::MissingVariable(NODE_NAME_ENV))?;

        let agent_endpoint = lookup(AGENT_ENDPOINT_ENV)
            .unwrap_or_else(|| format!("http://127.0.0.1:{DEFAULT_AGENT_PORT}"))
            .trim_end_matches('/')
            .to_owned();

        if !agent_endpoint.starts_with("http://") && !agent_endpoint.starts_with("https://") {
            return Err(FromEnvError::InvalidValue(AGENT_ENDPOINT_ENV, agent_endpoint));
        }

        Ok(Self {
            node_name,
            agent_endpoint,
            stamp_directory: lookup(STAMP_DIRECTORY_ENV)
                .unwrap_or_else(|| DEFAULT_STAMP_DIRECTORY.to_owned())
                .into(),
            reconcile_interval: seconds(
                &lookup,
                RECONCILE_INTERVAL_ENV,
                DEFAULT_RECONCILE_INTERVAL_SECS,
            )?,
            drain_timeout: seconds(&lookup, DRAIN_TIMEOUT_ENV, DEFAULT_DRAIN_TIMEOUT_SECS)?,
            upgrade_timeout: seconds(&lookup, UPGRADE_TIMEOUT_ENV, DEFAULT_UPGRADE_TIMEOUT_SECS)?,
        })
    }
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<Duration, FromEnvError> {
    match lookup(key) {
        Some(raw) => match raw.parse::<u64>() {
            Ok(secs) if secs > 0 && secs <= MAX_TIMEOUT_SECONDS => Ok(Duration::from_secs(secs)),
            _ => Err(FromEnvError::InvalidValue(key, raw)),
        },
        None => Ok(Duration::from_secs(default)),
    }
}
