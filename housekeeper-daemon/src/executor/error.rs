use std::{borrow::Cow, io, path::PathBuf};

use housekeeper_core::{protocol::ErrorKind, stamp::StampError, version::VersionParseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("{}", .0)]
    VersionParse(#[from] VersionParseError),
    #[error("Invalid upgrade request! {}", .0)]
    InvalidRequest(Cow<'static, str>),
    #[error("Couldn't start '{}'! Reason: {}", .0, .1)]
    CommandSpawn(String, io::Error),
    #[error("'{command}' failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("'{}' didn't finish before the request deadline and was killed!", .0)]
    CommandTimeout(String),
    #[error("The request deadline expired before the upgrade could start!")]
    DeadlineExceeded,
    #[error("{}", .0)]
    Stamp(#[from] StampError),
    #[error("Couldn't read '{}'! Reason: {}", .0.display(), .1)]
    OsReleaseAccess(PathBuf, io::Error),
    #[error("'{}' doesn't contain a VERSION entry!", .0.display())]
    OsVersionMissing(PathBuf),
    #[error("Couldn't read the boot id from '{}'! Reason: {}", .0.display(), .1)]
    BootIdAccess(PathBuf, io::Error),
}

impl UpgradeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UpgradeError::VersionParse(_) => ErrorKind::VersionParseError,
            UpgradeError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            UpgradeError::Stamp(StampError::InvalidKey(_)) => ErrorKind::InvalidRequest,
            UpgradeError::CommandSpawn(..) | UpgradeError::CommandFailed { .. } => {
                ErrorKind::ExternalCommandError
            }
            UpgradeError::CommandTimeout(_) | UpgradeError::DeadlineExceeded => {
                ErrorKind::DeadlineExceeded
            }
            UpgradeError::Stamp(_) => ErrorKind::StampAccessError,
            UpgradeError::OsReleaseAccess(..) | UpgradeError::OsVersionMissing(_) => {
                ErrorKind::OsReleaseError
            }
            UpgradeError::BootIdAccess(..) => ErrorKind::BootIdError,
        }
    }
}
