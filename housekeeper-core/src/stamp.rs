use std::{
    io,
    path::{Path, PathBuf},
};

use log::debug;
use thiserror::Error;
use tokio::fs;

use crate::DEFAULT_STAMP_DIRECTORY;

const KUBE_STAMP_SUFFIX: &str = ".stamp";
const REBASE_MARKER_PREFIX: &str = "os-";
const REBASE_MARKER_SUFFIX: &str = ".rebased";

#[derive(Debug, Error)]
pub enum StampError {
    #[error("'{}' is not a valid stamp key!", .0)]
    InvalidKey(String),
    #[error("Couldn't access stamp '{}'! Reason: {}", .0.display(), .1)]
    Io(PathBuf, io::Error),
}

/// Durable markers recording which version transitions were already applied on this node.
///
/// Kube stamps are zero-byte files. A rebase marker holds the boot id of the boot that staged
/// the image, so it only means "reboot pending" within that boot. Nothing is removed here.
/// The daemon is the only writer, the operator only checks for kube stamps.
#[derive(Debug, Clone)]
pub struct StampStore {
    directory: PathBuf,
}

impl Default for StampStore {
    fn default() -> Self {
        Self::new(DEFAULT_STAMP_DIRECTORY)
    }
}

impl StampStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn kube_stamp_path(&self, kube_version: &str) -> Result<PathBuf, StampError> {
        self.marker_path("", kube_version, KUBE_STAMP_SUFFIX)
    }

    pub fn rebase_marker_path(&self, os_version: &str) -> Result<PathBuf, StampError> {
        self.marker_path(REBASE_MARKER_PREFIX, os_version, REBASE_MARKER_SUFFIX)
    }

    pub async fn has_kube_stamp(&self, kube_version: &str) -> Result<bool, StampError> {
        exists(&self.kube_stamp_path(kube_version)?).await
    }

    pub async fn write_kube_stamp(&self, kube_version: &str) -> Result<PathBuf, StampError> {
        let path = self.kube_stamp_path(kube_version)?;
        self.touch(&path).await?;

        Ok(path)
    }

    /// Returns the boot id the image for `os_version` was staged in, if it was staged at all.
    pub async fn rebase_marker_boot_id(
        &self,
        os_version: &str,
    ) -> Result<Option<String>, StampError> {
        let path = self.rebase_marker_path(os_version)?;

        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content.trim().to_owned())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StampError::Io(path, err)),
        }
    }

    pub async fn write_rebase_marker(
        &self,
        os_version: &str,
        boot_id: &str,
    ) -> Result<PathBuf, StampError> {
        let path = self.rebase_marker_path(os_version)?;
        self.ensure_directory().await?;

        fs::write(&path, boot_id)
            .await
            .map_err(|err| StampError::Io(path.clone(), err))?;

        Ok(path)
    }

    fn marker_path(&self, prefix: &str, key: &str, suffix: &str) -> Result<PathBuf, StampError> {
        // the key ends up as a file name, it must not escape the stamp directory
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(StampError::InvalidKey(key.to_owned()));
        }

        Ok(self.directory.join(format!("{prefix}{key}{suffix}")))
    }

    async fn ensure_directory(&self) -> Result<(), StampError> {
        if !exists(&self.directory).await? {
            debug!("Creating stamp directory '{}'...", self.directory.display());
            fs::create_dir_all(&self.directory)
                .await
                .map_err(|err| StampError::Io(self.directory.clone(), err))?;
        }

        Ok(())
    }

    async fn touch(&self, path: &Path) -> Result<(), StampError> {
        self.ensure_directory().await?;

        if exists(path).await? {
            return Ok(());
        }

        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .open(path)
            .await
            .map_err(|err| StampError::Io(path.to_owned(), err))?;

        Ok(())
    }
}

async fn exists(path: &Path) -> Result<bool, StampError> {
    fs::try_exists(path)
        .await
        .map_err(|err| StampError::Io(path.to_owned(), err))
}
