use std::{fmt::Display, path::PathBuf, process::Stdio};

use async_trait::async_trait;
use log::debug;
use tokio::{process::Command, time::Instant};

use crate::executor::error::UpgradeError;

const OSTREE_IMAGE_PREFIX: &str = "ostree-unverified-image:docker://";
const KUBEADM: &str = "/usr/bin/kubeadm";
const SYSTEMCTL: &str = "systemctl";
const RPM_OSTREE: &str = "rpm-ostree";

pub const DEFAULT_BOOT_ID_PATH: &str = "/proc/sys/kernel/random/boot_id";

/// A single external tool invocation, run without a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl HostCommand {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_owned(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn os_rebase(image_url: &str) -> Self {
        Self::new(
            RPM_OSTREE,
            [
                "rebase".to_owned(),
                "--experimental".to_owned(),
                format!("{OSTREE_IMAGE_PREFIX}{image_url}"),
                "--bypass-driver".to_owned(),
            ],
        )
    }

    pub fn reboot() -> Self {
        Self::new(SYSTEMCTL, ["reboot"])
    }

    pub fn kubeadm_version() -> Self {
        Self::new(KUBEADM, ["version", "-o", "short"])
    }

    pub fn daemon_reload() -> Self {
        Self::new(SYSTEMCTL, ["daemon-reload"])
    }

    pub fn restart_kubelet() -> Self {
        Self::new(SYSTEMCTL, ["restart", "kubelet"])
    }

    pub fn upgrade_control_plane(kube_version: &str) -> Self {
        Self::new(KUBEADM, ["upgrade", "apply", "-y", kube_version])
    }

    pub fn upgrade_worker() -> Self {
        Self::new(KUBEADM, ["upgrade", "node"])
    }
}

impl Display for HostCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;

        for arg in &self.args {
            write!(f, " {arg}")?;
        }

        Ok(())
    }
}

/// Everything the upgrade executor needs from the machine it runs on.
#[async_trait]
pub trait Host: Send + Sync {
    /// Runs the command to completion and returns its stdout. The child is killed once the
    /// deadline passes.
    async fn run(&self, command: &HostCommand, deadline: Instant) -> Result<String, UpgradeError>;

    /// Returns the raw `VERSION` of the running operating system.
    async fn read_os_version(&self) -> Result<String, UpgradeError>;

    /// Returns an id that changes with every boot of the machine.
    async fn read_boot_id(&self) -> Result<String, UpgradeError>;
}

pub struct SystemHost {
    os_release_path: PathBuf,
    boot_id_path: PathBuf,
}

impl SystemHost {
    pub fn new(os_release_path: impl Into<PathBuf>, boot_id_path: impl Into<PathBuf>) -> Self {
        Self {
            os_release_path: os_release_path.into(),
            boot_id_path: boot_id_path.into(),
        }
    }
}

#[async_trait]
impl Host for SystemHost {
    async fn run(&self, command: &HostCommand, deadline: Instant) -> Result<String, UpgradeError> {
        debug!("Running '{command}'...");

        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout_at(deadline, child)
            .await
            .map_err(|_| UpgradeError::CommandTimeout(command.to_string()))?
            .map_err(|err| UpgradeError::CommandSpawn(command.to_string(), err))?;

        if !output.status.success() {
            return Err(UpgradeError::CommandFailed {
                command: command.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn read_os_version(&self) -> Result<String, UpgradeError> {
        let content = tokio::fs::read_to_string(&self.os_release_path)
            .await
            .map_err(|err| UpgradeError::OsReleaseAccess(self.os_release_path.clone(), err))?;

        parse_os_release_version(&content)
            .ok_or_else(|| UpgradeError::OsVersionMissing(self.os_release_path.clone()))
    }

    async fn read_boot_id(&self) -> Result<String, UpgradeError> {
        let content = tokio::fs::read_to_string(&self.boot_id_path)
            .await
            .map_err(|err| UpgradeError::BootIdAccess(self.boot_id_path.clone(), err))?;

        Ok(content.trim().to_owned())
    }
}

/// Extracts the first `VERSION=` entry of an os-release file, without its quotes.
pub fn parse_os_release_version(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| line.trim().strip_prefix("VERSION="))
        .map(|value| value.trim().trim_matches(|c: char| c == '"' || c == '\'').to_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::tempdir;
    use tokio::time::Instant;

    use super::{parse_os_release_version, Host, HostCommand, SystemHost, DEFAULT_BOOT_ID_PATH};
    use crate::executor::error::UpgradeError;

    #[test]
    fn os_release_version_is_unquoted() {
        let content = "NAME=\"NestOS\"\nVERSION_ID=\"5\"\nVERSION=\"5.2\"\nVERSION=\"9.9\"\n";

        assert_eq!(parse_os_release_version(content).as_deref(), Some("5.2"));
        assert_eq!(parse_os_release_version("VERSION=22.03\n").as_deref(), Some("22.03"));
        assert_eq!(parse_os_release_version("VERSION_ID=5\n"), None);
        assert_eq!(parse_os_release_version("VERSION=\"\"\n"), None);
    }

    #[test]
    fn commands_render_like_a_shell_line() {
        assert_eq!(
            HostCommand::os_rebase("registry/os:5.2").to_string(),
            "rpm-ostree rebase --experimental ostree-unverified-image:docker://registry/os:5.2 --bypass-driver"
        );
        assert_eq!(
            HostCommand::upgrade_control_plane("1.28.0").to_string(),
            "/usr/bin/kubeadm upgrade apply -y 1.28.0"
        );
        assert_eq!(HostCommand::upgrade_worker().to_string(), "/usr/bin/kubeadm upgrade node");
    }

    #[tokio::test]
    async fn reads_version_from_the_configured_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("os-release");
        std::fs::write(&path, "ID=nestos\nVERSION=\"5.2\"\n").unwrap();

        let host = SystemHost::new(&path, DEFAULT_BOOT_ID_PATH);

        assert_eq!(host.read_os_version().await.unwrap(), "5.2");
    }

    #[tokio::test]
    async fn boot_id_is_trimmed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boot_id");
        std::fs::write(&path, "6f1b3c2e-5a0d-4c1e-9a4b-2d7e8f901234\n").unwrap();

        let host = SystemHost::new("/etc/os-release", &path);

        assert_eq!(
            host.read_boot_id().await.unwrap(),
            "6f1b3c2e-5a0d-4c1e-9a4b-2d7e8f901234"
        );
        assert!(matches!(
            SystemHost::new("/etc/os-release", dir.path().join("missing"))
                .read_boot_id()
                .await,
            Err(UpgradeError::BootIdAccess(..))
        ));
    }

    #[tokio::test]
    async fn missing_os_release_is_reported() {
        let dir = tempdir().unwrap();
        let host = SystemHost::new(dir.path().join("missing"), DEFAULT_BOOT_ID_PATH);

        assert!(matches!(
            host.read_os_version().await,
            Err(UpgradeError::OsReleaseAccess(..))
        ));
    }

    #[tokio::test]
    async fn captures_stdout_of_successful_commands() {
        let host = SystemHost::new("/etc/os-release", DEFAULT_BOOT_ID_PATH);
        let deadline = Instant::now() + Duration::from_secs(10);

        let output = host
            .run(&HostCommand::new("sh", ["-c", "echo v1.28.0"]), deadline)
            .await
            .unwrap();

        assert_eq!(output.trim(), "v1.28.0");
    }

    #[tokio::test]
    async fn failing_commands_carry_their_stderr() {
        let host = SystemHost::new("/etc/os-release", DEFAULT_BOOT_ID_PATH);
        let deadline = Instant::now() + Duration::from_secs(10);

        let error = host
            .run(&HostCommand::new("sh", ["-c", "echo broken >&2; exit 3"]), deadline)
            .await
            .unwrap_err();

        match error {
            UpgradeError::CommandFailed { stderr, .. } => assert_eq!(stderr, "broken"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn hung_commands_are_killed_at_the_deadline() {
        let host = SystemHost::new("/etc/os-release", DEFAULT_BOOT_ID_PATH);
        let deadline = Instant::now() + Duration::from_millis(200);

        let error = host
            .run(&HostCommand::new("sleep", ["30"]), deadline)
            .await
            .unwrap_err();

        assert!(matches!(error, UpgradeError::CommandTimeout(_)));
    }

    #[tokio::test]
    async fn missing_programs_fail_to_spawn() {
        let host = SystemHost::new("/etc/os-release", DEFAULT_BOOT_ID_PATH);
        let deadline = Instant::now() + Duration::from_secs(10);

        let error = host
            .run(&HostCommand::new("/nonexistent/housekeeper-tool", Vec::<String>::new()), deadline)
            .await
            .unwrap_err();

        assert!(matches!(error, UpgradeError::CommandSpawn(..)));
    }
}
