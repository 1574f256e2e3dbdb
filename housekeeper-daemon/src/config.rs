use std::{net::SocketAddr, path::PathBuf, time::Duration};

use housekeeper_core::{protocol::MAX_TIMEOUT_SECONDS, DEFAULT_AGENT_PORT, DEFAULT_STAMP_DIRECTORY};
use thiserror::Error;

use crate::host::DEFAULT_BOOT_ID_PATH;

pub const NODE_NAME_ENV: &str = "NODE_NAME";
pub const LISTEN_ADDRESS_ENV: &str = "HOUSEKEEPER_LISTEN_ADDRESS";
pub const STAMP_DIRECTORY_ENV: &str = "HOUSEKEEPER_STAMP_DIR";
pub const OS_RELEASE_PATH_ENV: &str = "HOUSEKEEPER_OS_RELEASE_PATH";
pub const COMMAND_TIMEOUT_ENV: &str = "HOUSEKEEPER_COMMAND_TIMEOUT_SECS";
pub const BOOT_ID_PATH_ENV: &str = "HOUSEKEEPER_BOOT_ID_PATH";

const DEFAULT_OS_RELEASE_PATH: &str = "/etc/os-release";
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30 * 60;

#[derive(Debug, Error)]
pub enum FromEnvError {
    #[error("{} has an invalid value '{}'!", .0, .1)]
    InvalidValue(&'static str, String),
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// only used for log context
    pub node_name: Option<String>,
    pub listen_address: SocketAddr,
    pub stamp_directory: PathBuf,
    pub os_release_path: PathBuf,
    pub boot_id_path: PathBuf,
    /// used when the caller doesn't send its own deadline
    pub command_timeout: Duration,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self, FromEnvError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, FromEnvError> {
        let listen_address = match lookup(LISTEN_ADDRESS_ENV) {
            Some(raw) => raw
                .parse()
                .map_err(|_| FromEnvError::InvalidValue(LISTEN_ADDRESS_ENV, raw))?,
            None => SocketAddr::from(([127, 0, 0, 1], DEFAULT_AGENT_PORT)),
        };

        let command_timeout = match lookup(COMMAND_TIMEOUT_ENV) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 && secs <= MAX_TIMEOUT_SECONDS => Duration::from_secs(secs),
                _ => return Err(FromEnvError::InvalidValue(COMMAND_TIMEOUT_ENV, raw)),
            },
            None => Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        };

        Ok(Self {
            node_name: lookup(NODE_NAME_ENV).filter(|name| !name.trim().is_empty()),
            listen_address,
            stamp_directory: lookup(STAMP_DIRECTORY_ENV)
                .unwrap_or_else(|| DEFAULT_STAMP_DIRECTORY.to_owned())
                .into(),
            os_release_path: lookup(OS_RELEASE_PATH_ENV)
                .unwrap_or_else(|| DEFAULT_OS_RELEASE_PATH.to_owned())
                .into(),
            boot_id_path: lookup(BOOT_ID_PATH_ENV)
                .unwrap_or_else(|| DEFAULT_BOOT_ID_PATH.to_owned())
                .into(),
            command_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, path::Path, time::Duration};

    use super::{
        DaemonConfig, FromEnvError, COMMAND_TIMEOUT_ENV, LISTEN_ADDRESS_ENV, NODE_NAME_ENV,
    };

    fn config_from(vars: &[(&str, &str)]) -> Result<DaemonConfig, FromEnvError> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();

        DaemonConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_listen_locally_on_the_agent_port() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.listen_address.to_string(), "127.0.0.1:54444");
        assert_eq!(config.stamp_directory, Path::new("/var/housekeeper"));
        assert_eq!(config.os_release_path, Path::new("/etc/os-release"));
        assert_eq!(config.boot_id_path, Path::new("/proc/sys/kernel/random/boot_id"));
        assert_eq!(config.command_timeout, Duration::from_secs(1800));
        assert_eq!(config.node_name, None);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            (LISTEN_ADDRESS_ENV, "0.0.0.0:9000"),
            (COMMAND_TIMEOUT_ENV, "15"),
            (NODE_NAME_ENV, "node-a"),
        ])
        .unwrap();

        assert_eq!(config.node_name.as_deref(), Some("node-a"));
        assert_eq!(config.listen_address.port(), 9000);
        assert_eq!(config.command_timeout, Duration::from_secs(15));
    }

    #[test]
    fn invalid_values_are_reported() {
        assert!(config_from(&[(LISTEN_ADDRESS_ENV, "nowhere")]).is_err());
        assert!(config_from(&[(COMMAND_TIMEOUT_ENV, "0")]).is_err());
        assert!(config_from(&[(COMMAND_TIMEOUT_ENV, "soon")]).is_err());
        assert!(config_from(&[(COMMAND_TIMEOUT_ENV, &u64::MAX.to_string())]).is_err());
    }
}
