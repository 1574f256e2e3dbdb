use std::{cmp::Ordering, sync::Arc, time::Duration};

use housekeeper_core::{
    protocol::{NodeRole, UpgradeRequest, MAX_TIMEOUT_SECONDS},
    stamp::StampStore,
    version::compare_versions,
};
use log::{info, warn};
use tokio::{sync::Mutex, time::Instant};

use crate::host::{Host, HostCommand};

use self::error::UpgradeError;

pub mod error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsOutcome {
    AlreadyCurrent,
    RebootRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KubeOutcome {
    AlreadyStamped,
    /// kubeadm is older than the target, nothing was applied or stamped and the operator keeps
    /// the node cordoned until the tooling catches up
    ToolingBehind,
    Upgraded,
    /// a reboot was requested earlier in the same call
    Deferred,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpgradeOutcome {
    pub os: Option<OsOutcome>,
    pub kube: Option<KubeOutcome>,
}

/// Applies OS and kubernetes version transitions on the local node.
///
/// All calls are serialized: a request waits for the one in flight to finish and then runs
/// as sent, even if the node moved on in the meantime.
pub struct UpgradeExecutor {
    node_name: String,
    host: Arc<dyn Host>,
    stamps: StampStore,
    default_timeout: Duration,
    lock: Mutex<()>,
}

impl UpgradeExecutor {
    pub fn new(host: Arc<dyn Host>, stamps: StampStore, default_timeout: Duration) -> Self {
        Self {
            node_name: "local node".to_owned(),
            host,
            stamps,
            default_timeout,
            lock: Mutex::new(()),
        }
    }

    pub fn with_node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    pub async fn apply(&self, request: &UpgradeRequest) -> Result<UpgradeOutcome, UpgradeError> {
        let deadline = self.deadline_for(request)?;

        validate_request(request)?;

        let _guard = self.lock.lock().await;

        if Instant::now() >= deadline {
            return Err(UpgradeError::DeadlineExceeded);
        }

        let mut outcome = UpgradeOutcome::default();

        if let Some(os_version) = request.os_target() {
            outcome.os = Some(
                self.upgrade_os(os_version, &request.os_image_url, deadline)
                    .await?,
            );
        }

        if let Some(kube_version) = request.kube_target() {
            outcome.kube = Some(match outcome.os {
                Some(OsOutcome::RebootRequested) => {
                    info!("Reboot pending, kubernetes upgrade to {kube_version} will be retried afterwards");
                    KubeOutcome::Deferred
                }
                _ => {
                    self.upgrade_kube(kube_version, request.node_role, deadline)
                        .await?
                }
            });
        }

        Ok(outcome)
    }

    fn deadline_for(&self, request: &UpgradeRequest) -> Result<Instant, UpgradeError> {
        let timeout = match request.timeout_seconds {
            Some(secs) if secs > MAX_TIMEOUT_SECONDS => {
                return Err(UpgradeError::InvalidRequest(
                    format!("timeoutSeconds can't exceed {MAX_TIMEOUT_SECONDS}").into(),
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => self.default_timeout,
        };

        Instant::now()
            .checked_add(timeout)
            .ok_or(UpgradeError::InvalidRequest("timeoutSeconds is out of range".into()))
    }

    async fn upgrade_os(
        &self,
        os_version: &str,
        image_url: &str,
        deadline: Instant,
    ) -> Result<OsOutcome, UpgradeError> {
        let current_version = self.host.read_os_version().await?;

        if compare_versions(&current_version, os_version)? == Ordering::Equal {
            info!("The current OS version {current_version} and the requested version {os_version} are the same");
            return Ok(OsOutcome::AlreadyCurrent);
        }

        let boot_id = self.host.read_boot_id().await?;

        match self.stamps.rebase_marker_boot_id(os_version).await? {
            Some(staged_in) if staged_in == boot_id => {
                warn!("OS image for {os_version} is already staged on '{}', requesting the pending reboot again", self.node_name);
            }
            staged_in => {
                if staged_in.is_some() {
                    warn!("'{}' came back on OS {current_version} after a reboot into {os_version}, staging the image again", self.node_name);
                }

                info!("Rebasing OS from {current_version} to {os_version} ({image_url})...");
                self.host
                    .run(&HostCommand::os_rebase(image_url), deadline)
                    .await?;
                self.stamps
                    .write_rebase_marker(os_version, &boot_id)
                    .await?;
            }
        }

        info!("Rebooting into OS {os_version}...");
        self.host.run(&HostCommand::reboot(), deadline).await?;

        Ok(OsOutcome::RebootRequested)
    }

    async fn upgrade_kube(
        &self,
        kube_version: &str,
        role: NodeRole,
        deadline: Instant,
    ) -> Result<KubeOutcome, UpgradeError> {
        if self.stamps.has_kube_stamp(kube_version).await? {
            info!("Kubernetes {kube_version} was already applied on this node");
            return Ok(KubeOutcome::AlreadyStamped);
        }

        let kubeadm_version = self
            .host
            .run(&HostCommand::kubeadm_version(), deadline)
            .await?;
        let kubeadm_version = kubeadm_version.trim();

        if compare_versions(kubeadm_version, kube_version)? == Ordering::Less {
            warn!("kubeadm {kubeadm_version} on '{}' is older than the requested kubernetes {kube_version}, nothing was applied and the node stays cordoned until kubeadm is updated", self.node_name);
            return Ok(KubeOutcome::ToolingBehind);
        }

        info!("Upgrading {role} node to kubernetes {kube_version}...");

        self.host
            .run(&HostCommand::daemon_reload(), deadline)
            .await?;
        self.host
            .run(&HostCommand::restart_kubelet(), deadline)
            .await?;

        let upgrade = match role {
            NodeRole::ControlPlane => HostCommand::upgrade_control_plane(kube_version),
            NodeRole::Worker => HostCommand::upgrade_worker(),
        };
        self.host.run(&upgrade, deadline).await?;

        let stamp = self.stamps.write_kube_stamp(kube_version).await?;
        info!("Kubernetes {kube_version} applied, stamped at '{}'", stamp.display());

        Ok(KubeOutcome::Upgraded)
    }
}

fn validate_request(request: &UpgradeRequest) -> Result<(), UpgradeError> {
    if request.os_target().is_some() && request.os_image_url.trim().is_empty() {
        return Err(UpgradeError::InvalidRequest(
            "osImageUrl is required when osVersion is set".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use housekeeper_core::{
        protocol::{NodeRole, UpgradeRequest, UpgradeRequestBuilder, MAX_TIMEOUT_SECONDS},
        stamp::StampStore,
    };
    use tempfile::{tempdir, TempDir};
    use tokio::time::Instant;

    use super::{KubeOutcome, OsOutcome, UpgradeExecutor};
    use crate::{
        executor::error::UpgradeError,
        host::{Host, HostCommand},
    };

    /// Records every command and answers `kubeadm version` with a fixed value.
    struct FakeHost {
        os_version: String,
        kubeadm_version: String,
        failing_command: Option<HostCommand>,
        delay: Duration,
        boot_id: Mutex<String>,
        log: Mutex<Vec<String>>,
    }

    impl FakeHost {
        fn new(os_version: &str, kubeadm_version: &str) -> Self {
            Self {
                os_version: os_version.to_owned(),
                kubeadm_version: kubeadm_version.to_owned(),
                failing_command: None,
                delay: Duration::ZERO,
                boot_id: Mutex::new("boot-1".to_owned()),
                log: Mutex::new(Vec::new()),
            }
        }

        /// Simulates the machine coming back up, without changing the OS version it reports.
        fn reboot(&self, boot_id: &str) {
            *self.boot_id.lock().unwrap() = boot_id.to_owned();
        }

        fn commands(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Host for FakeHost {
        async fn run(
            &self,
            command: &HostCommand,
            _deadline: Instant,
        ) -> Result<String, UpgradeError> {
            self.log.lock().unwrap().push(format!("start {command}"));
            tokio::time::sleep(self.delay).await;
            self.log.lock().unwrap().push(format!("end {command}"));

            if self.failing_command.as_ref() == Some(command) {
                return Err(UpgradeError::CommandFailed {
                    command: command.to_string(),
                    status: "exit status: 1".to_owned(),
                    stderr: String::new(),
                });
            }

            if *command == HostCommand::kubeadm_version() {
                return Ok(format!("{}\n", self.kubeadm_version));
            }

            Ok(String::new())
        }

        async fn read_os_version(&self) -> Result<String, UpgradeError> {
            Ok(self.os_version.clone())
        }

        async fn read_boot_id(&self) -> Result<String, UpgradeError> {
            Ok(self.boot_id.lock().unwrap().clone())
        }
    }

    fn executor(host: FakeHost) -> (UpgradeExecutor, Arc<FakeHost>, TempDir) {
        let dir = tempdir().unwrap();
        let host = Arc::new(host);
        let executor = UpgradeExecutor::new(
            host.clone(),
            StampStore::new(dir.path()),
            Duration::from_secs(60),
        );

        (executor, host, dir)
    }

    fn kube_request(version: &str, role: NodeRole) -> UpgradeRequest {
        UpgradeRequestBuilder::default()
            .kube_version(version)
            .node_role(role)
            .build()
            .unwrap()
    }

    fn started(host: &FakeHost) -> Vec<String> {
        host.commands()
            .into_iter()
            .filter_map(|line| line.strip_prefix("start ").map(str::to_owned))
            .collect()
    }

    fn rebases(host: &FakeHost) -> usize {
        started(host)
            .iter()
            .filter(|c| c.starts_with("rpm-ostree"))
            .count()
    }

    #[tokio::test]
    async fn worker_upgrade_restarts_kubelet_and_writes_the_stamp() {
        let (executor, host, dir) = executor(FakeHost::new("5.2", "v1.28.0"));

        let outcome = executor
            .apply(&kube_request("1.28.0", NodeRole::Worker))
            .await
            .unwrap();

        assert_eq!(outcome.kube, Some(KubeOutcome::Upgraded));
        assert_eq!(outcome.os, None);
        assert_eq!(
            started(&host),
            vec![
                "/usr/bin/kubeadm version -o short",
                "systemctl daemon-reload",
                "systemctl restart kubelet",
                "/usr/bin/kubeadm upgrade node",
            ]
        );
        assert!(dir.path().join("1.28.0.stamp").exists());
    }

    #[tokio::test]
    async fn control_plane_runs_upgrade_apply_with_the_version() {
        let (executor, host, _dir) = executor(FakeHost::new("5.2", "v1.29.1"));

        executor
            .apply(&kube_request("1.29.0", NodeRole::ControlPlane))
            .await
            .unwrap();

        assert_eq!(
            started(&host).last().map(String::as_str),
            Some("/usr/bin/kubeadm upgrade apply -y 1.29.0")
        );
    }

    #[tokio::test]
    async fn repeated_kube_requests_run_the_upgrade_once() {
        let (executor, host, _dir) = executor(FakeHost::new("5.2", "v1.28.0"));
        let request = kube_request("1.28.0", NodeRole::Worker);

        executor.apply(&request).await.unwrap();
        let commands_after_first = started(&host).len();
        let second = executor.apply(&request).await.unwrap();

        assert_eq!(second.kube, Some(KubeOutcome::AlreadyStamped));
        assert_eq!(started(&host).len(), commands_after_first);
    }

    #[tokio::test]
    async fn versions_newer_than_kubeadm_are_declined() {
        for (kubeadm, requested) in [("v1.27.3", "1.28.0"), ("v1.28.0", "1.28.1"), ("v1.28.0-rc.1", "1.28.0")] {
            let (executor, host, dir) = executor(FakeHost::new("5.2", kubeadm));

            let outcome = executor
                .apply(&kube_request(requested, NodeRole::Worker))
                .await
                .unwrap();

            assert_eq!(outcome.kube, Some(KubeOutcome::ToolingBehind));
            assert_eq!(started(&host), vec!["/usr/bin/kubeadm version -o short"]);
            assert!(!dir.path().join(format!("{requested}.stamp")).exists());
        }
    }

    #[tokio::test]
    async fn failed_upgrade_leaves_no_stamp() {
        let mut host = FakeHost::new("5.2", "v1.28.0");
        host.failing_command = Some(HostCommand::upgrade_worker());
        let (executor, host, dir) = executor(host);
        let request = kube_request("1.28.0", NodeRole::Worker);

        let error = executor.apply(&request).await.unwrap_err();

        assert!(matches!(error, UpgradeError::CommandFailed { .. }));
        assert!(!dir.path().join("1.28.0.stamp").exists());

        // a retry runs the whole sequence again
        let _ = executor.apply(&request).await;
        assert_eq!(
            started(&host)
                .iter()
                .filter(|c| *c == "/usr/bin/kubeadm upgrade node")
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn malformed_kubeadm_version_is_a_parse_error() {
        let (executor, _host, _dir) = executor(FakeHost::new("5.2", "unknown"));

        let error = executor
            .apply(&kube_request("1.28.0", NodeRole::Worker))
            .await
            .unwrap_err();

        assert!(matches!(error, UpgradeError::VersionParse(_)));
    }

    #[tokio::test]
    async fn current_os_version_is_left_alone() {
        let (executor, host, _dir) = executor(FakeHost::new("5.2", "v1.28.0"));
        let request = UpgradeRequestBuilder::default()
            .os_version("5.2")
            .os_image_url("registry/os:5.2")
            .build()
            .unwrap();

        let outcome = executor.apply(&request).await.unwrap();

        assert_eq!(outcome.os, Some(OsOutcome::AlreadyCurrent));
        assert!(host.commands().is_empty());
    }

    #[tokio::test]
    async fn os_upgrade_rebases_then_reboots() {
        let (executor, host, dir) = executor(FakeHost::new("5.1", "v1.28.0"));
        let request = UpgradeRequestBuilder::default()
            .os_version("5.2")
            .os_image_url("registry/os:5.2")
            .build()
            .unwrap();

        let outcome = executor.apply(&request).await.unwrap();

        assert_eq!(outcome.os, Some(OsOutcome::RebootRequested));
        assert_eq!(
            started(&host),
            vec![
                "rpm-ostree rebase --experimental ostree-unverified-image:docker://registry/os:5.2 --bypass-driver",
                "systemctl reboot",
            ]
        );
        assert!(dir.path().join("os-5.2.rebased").exists());

        // same boot, the retry must not rebase a second time
        executor.apply(&request).await.unwrap();
        assert_eq!(rebases(&host), 1);
        assert_eq!(started(&host).last().map(String::as_str), Some("systemctl reboot"));
    }

    #[tokio::test]
    async fn image_is_staged_again_when_the_reboot_did_not_land() {
        let (executor, host, dir) = executor(FakeHost::new("5.1", "v1.28.0"));
        let request = UpgradeRequestBuilder::default()
            .os_version("5.2")
            .os_image_url("registry/os:5.2")
            .build()
            .unwrap();
        executor.apply(&request).await.unwrap();
        assert_eq!(rebases(&host), 1);

        // rolled back to 5.1 in a new boot
        host.reboot("boot-2");
        let outcome = executor.apply(&request).await.unwrap();

        assert_eq!(outcome.os, Some(OsOutcome::RebootRequested));
        assert_eq!(rebases(&host), 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("os-5.2.rebased")).unwrap(),
            "boot-2"
        );

        // and the pending reboot of that boot is still only requested again
        executor.apply(&request).await.unwrap();
        assert_eq!(rebases(&host), 2);
    }

    #[tokio::test]
    async fn failed_rebase_does_not_reboot() {
        let mut host = FakeHost::new("5.1", "v1.28.0");
        host.failing_command = Some(HostCommand::os_rebase("registry/os:5.2"));
        let (executor, host, dir) = executor(host);
        let request = UpgradeRequestBuilder::default()
            .os_version("5.2")
            .os_image_url("registry/os:5.2")
            .build()
            .unwrap();

        assert!(executor.apply(&request).await.is_err());
        assert!(!started(&host).contains(&"systemctl reboot".to_owned()));
        assert!(!dir.path().join("os-5.2.rebased").exists());
    }

    #[tokio::test]
    async fn kube_step_waits_for_a_requested_reboot() {
        let (executor, host, dir) = executor(FakeHost::new("5.1", "v1.28.0"));
        let request = UpgradeRequestBuilder::default()
            .os_version("5.2")
            .os_image_url("registry/os:5.2")
            .kube_version("1.28.0")
            .build()
            .unwrap();

        let outcome = executor.apply(&request).await.unwrap();

        assert_eq!(outcome.kube, Some(KubeOutcome::Deferred));
        assert!(!started(&host).iter().any(|c| c.contains("kubeadm")));
        assert!(!dir.path().join("1.28.0.stamp").exists());
    }

    #[tokio::test]
    async fn os_and_kube_steps_both_run_when_os_is_current() {
        let (executor, host, _dir) = executor(FakeHost::new("5.2", "v1.28.0"));
        let request = UpgradeRequestBuilder::default()
            .os_version("5.2")
            .os_image_url("registry/os:5.2")
            .kube_version("1.28.0")
            .build()
            .unwrap();

        let outcome = executor.apply(&request).await.unwrap();

        assert_eq!(outcome.os, Some(OsOutcome::AlreadyCurrent));
        assert_eq!(outcome.kube, Some(KubeOutcome::Upgraded));
        assert!(started(&host).contains(&"/usr/bin/kubeadm upgrade node".to_owned()));
    }

    #[tokio::test]
    async fn malformed_os_versions_fail() {
        let (executor, host, _dir) = executor(FakeHost::new("rolling", "v1.28.0"));
        let request = UpgradeRequestBuilder::default()
            .os_version("5.2")
            .os_image_url("registry/os:5.2")
            .build()
            .unwrap();

        let error = executor.apply(&request).await.unwrap_err();

        assert!(matches!(error, UpgradeError::VersionParse(_)));
        assert!(host.commands().is_empty());
    }

    #[tokio::test]
    async fn os_version_without_image_is_rejected() {
        let (executor, host, _dir) = executor(FakeHost::new("5.1", "v1.28.0"));
        let request = UpgradeRequestBuilder::default()
            .os_version("5.2")
            .build()
            .unwrap();

        let error = executor.apply(&request).await.unwrap_err();

        assert!(matches!(error, UpgradeError::InvalidRequest(_)));
        assert!(host.commands().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_requests_never_interleave() {
        let mut host = FakeHost::new("5.2", "v1.30.0");
        host.delay = Duration::from_millis(20);
        let (executor, host, dir) = executor(host);
        let executor = Arc::new(executor);

        let first = {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .apply(&kube_request("1.28.0", NodeRole::Worker))
                    .await
            })
        };
        let second = {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .apply(&kube_request("1.29.0", NodeRole::Worker))
                    .await
            })
        };

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let log = host.commands();
        assert_eq!(log.len(), 16);

        // every command ends before the next one starts
        for pair in log.chunks(2) {
            let started = pair[0].strip_prefix("start ").unwrap();
            let ended = pair[1].strip_prefix("end ").unwrap();
            assert_eq!(started, ended);
        }

        // and the two sequences run back to back
        let upgrades = log
            .iter()
            .enumerate()
            .filter(|(_, line)| *line == "end /usr/bin/kubeadm upgrade node")
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        assert_eq!(upgrades, vec![7, 15]);

        assert!(dir.path().join("1.28.0.stamp").exists());
        assert!(dir.path().join("1.29.0.stamp").exists());
    }

    #[tokio::test]
    async fn expired_deadline_while_waiting_skips_the_request() {
        let mut host = FakeHost::new("5.2", "v1.30.0");
        host.delay = Duration::from_millis(600);
        let (executor, host, _dir) = executor(host);
        let executor = Arc::new(executor);

        let slow = {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .apply(&kube_request("1.28.0", NodeRole::Worker))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut impatient = kube_request("1.29.0", NodeRole::Worker);
        impatient.timeout_seconds = Some(1);
        let error = executor.apply(&impatient).await.unwrap_err();

        assert!(matches!(error, UpgradeError::DeadlineExceeded));
        slow.await.unwrap().unwrap();
        assert!(!host.commands().iter().any(|c| c.contains("1.29.0")));
    }

    #[tokio::test]
    async fn out_of_range_timeouts_are_rejected() {
        let (executor, host, _dir) = executor(FakeHost::new("5.2", "v1.28.0"));

        for timeout in [u64::MAX, MAX_TIMEOUT_SECONDS + 1] {
            let mut request = kube_request("1.28.0", NodeRole::Worker);
            request.timeout_seconds = Some(timeout);

            let error = executor.apply(&request).await.unwrap_err();

            assert!(matches!(error, UpgradeError::InvalidRequest(_)));
        }
        assert!(host.commands().is_empty());

        let mut request = kube_request("1.28.0", NodeRole::Worker);
        request.timeout_seconds = Some(MAX_TIMEOUT_SECONDS);
        assert!(executor.apply(&request).await.is_ok());
    }
}
