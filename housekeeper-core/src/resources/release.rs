use derive_builder::Builder;
use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, DaemonSetSpec},
        core::v1::{
            Container, EnvVar, EnvVarSource, HostPathVolumeSource, ObjectFieldSelector, PodSpec,
            PodTemplateSpec, SecurityContext, ServiceAccount, Toleration, Volume, VolumeMount,
        },
        rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject},
    },
    apimachinery::pkg::apis::meta::v1::LabelSelector,
};
use kube::{core::ObjectMeta, Resource};

use crate::{
    resources::{crd::v1alpha1::update::Update, labels::get_housekeeper_labels},
    DEFAULT_AGENT_PORT, DEFAULT_STAMP_DIRECTORY, OPERATOR_CLUSTERROLE_NAME,
};

pub const RELEASE_NAME: &str = "housekeeper";
pub const DEFAULT_DAEMON_IMAGE: &str = "ghcr.io/housekeeper/housekeeper-daemon:latest";
pub const DEFAULT_OPERATOR_IMAGE: &str = "ghcr.io/housekeeper/housekeeper-operator:latest";

const STAMP_VOLUME: &str = "stamps";
const HOST_ETC_VOLUME: &str = "host-etc";
const HOST_ETC_MOUNT: &str = "/host/etc";

/// Everything needed to run the daemon and the operator on each node of the cluster.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct Release {
    pub namespace: String,
    #[builder(default = "DEFAULT_DAEMON_IMAGE.to_owned()")]
    pub daemon_image_name: String,
    #[builder(default = "DEFAULT_OPERATOR_IMAGE.to_owned()")]
    pub operator_image_name: String,
    #[builder(default = "DEFAULT_STAMP_DIRECTORY.to_owned()")]
    pub stamp_directory: String,
}

impl Release {
    pub fn generate_metadata(&self) -> ObjectMeta {
        ObjectMeta {
            labels: Some(get_housekeeper_labels()),
            namespace: Some(self.namespace.to_owned()),
            name: Some(RELEASE_NAME.to_owned()),
            ..Default::default()
        }
    }

    pub fn generate_clusterwide_metadata(&self) -> ObjectMeta {
        ObjectMeta {
            labels: Some(get_housekeeper_labels()),
            name: Some(OPERATOR_CLUSTERROLE_NAME.to_owned()),
            ..Default::default()
        }
    }

    pub fn generate_service_account(&self) -> ServiceAccount {
        ServiceAccount {
            metadata: self.generate_metadata(),
            automount_service_account_token: Some(true),
            ..Default::default()
        }
    }

    pub fn generate_cluster_role(&self) -> ClusterRole {
        ClusterRole {
            metadata: self.generate_clusterwide_metadata(),
            rules: Some(vec![
                rule("", "nodes", &["get", "list", "watch", "patch", "update"]),
                rule("", "pods", &["get", "list"]),
                rule("", "pods/eviction", &["create"]),
                rule(
                    &Update::group(&()),
                    &Update::plural(&()),
                    &["get", "list", "watch"],
                ),
            ]),
            ..Default::default()
        }
    }

    pub fn generate_cluster_role_binding(
        &self,
        role: &ClusterRole,
        account: &ServiceAccount,
    ) -> ClusterRoleBinding {
        ClusterRoleBinding {
            metadata: self.generate_clusterwide_metadata(),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_owned(),
                kind: "ClusterRole".to_owned(),
                name: role.metadata.name.clone().unwrap_or_default(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_owned(),
                name: account.metadata.name.clone().unwrap_or_default(),
                namespace: account.metadata.namespace.clone(),
                ..Default::default()
            }]),
        }
    }

    pub fn generate_daemonset(&self, account: &ServiceAccount) -> DaemonSet {
        let labels = get_housekeeper_labels();

        DaemonSet {
            metadata: self.generate_metadata(),
            spec: Some(DaemonSetSpec {
                selector: LabelSelector {
                    match_expressions: None,
                    match_labels: Some(labels.to_owned()),
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        service_account_name: account.metadata.name.clone(),
                        automount_service_account_token: Some(true),
                        host_pid: Some(true),
                        containers: vec![
                            self.generate_daemon_container(),
                            self.generate_operator_container(),
                        ],
                        tolerations: Some(vec![Toleration {
                            operator: Some("Exists".to_owned()),
                            ..Default::default()
                        }]),
                        volumes: Some(vec![
                            host_path_volume(
                                STAMP_VOLUME,
                                &self.stamp_directory,
                                "DirectoryOrCreate",
                            ),
                            host_path_volume(HOST_ETC_VOLUME, "/etc", "Directory"),
                        ]),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn generate_daemon_container(&self) -> Container {
        Container {
            name: "housekeeper-daemon".to_owned(),
            image: Some(self.daemon_image_name.to_owned()),
            image_pull_policy: Some("Always".to_owned()),
            env: Some(vec![
                node_name_env(),
                env("HOUSEKEEPER_LISTEN_ADDRESS", &format!("127.0.0.1:{DEFAULT_AGENT_PORT}")),
                env("HOUSEKEEPER_STAMP_DIR", &self.stamp_directory),
                env("HOUSEKEEPER_OS_RELEASE_PATH", &format!("{HOST_ETC_MOUNT}/os-release")),
            ]),
            security_context: Some(SecurityContext {
                privileged: Some(true),
                ..Default::default()
            }),
            volume_mounts: Some(vec![
                mount(STAMP_VOLUME, &self.stamp_directory, false),
                mount(HOST_ETC_VOLUME, HOST_ETC_MOUNT, true),
            ]),
            ..Default::default()
        }
    }

    fn generate_operator_container(&self) -> Container {
        Container {
            name: "housekeeper-operator".to_owned(),
            image: Some(self.operator_image_name.to_owned()),
            image_pull_policy: Some("Always".to_owned()),
            env: Some(vec![
                node_name_env(),
                env(
                    "HOUSEKEEPER_AGENT_ENDPOINT",
                    &format!("http://127.0.0.1:{DEFAULT_AGENT_PORT}"),
                ),
                env("HOUSEKEEPER_STAMP_DIR", &self.stamp_directory),
            ]),
            volume_mounts: Some(vec![mount(STAMP_VOLUME, &self.stamp_directory, true)]),
            ..Default::default()
        }
    }
}

fn rule(api_group: &str, resource: &str, verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![api_group.to_owned()]),
        resources: Some(vec![resource.to_owned()]),
        verbs: verbs.iter().map(|verb| verb.to_string()).collect(),
        ..Default::default()
    }
}

fn node_name_env() -> EnvVar {
    EnvVar {
        name: "NODE_NAME".to_owned(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: "spec.nodeName".to_owned(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_owned(),
        value: Some(value.to_owned()),
        ..Default::default()
    }
}

fn mount(volume: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: volume.to_owned(),
        mount_path: path.to_owned(),
        read_only: Some(read_only),
        ..Default::default()
    }
}

fn host_path_volume(name: &str, path: &str, type_: &str) -> Volume {
    Volume {
        name: name.to_owned(),
        host_path: Some(HostPathVolumeSource {
            path: path.to_owned(),
            type_: Some(type_.to_owned()),
        }),
        ..Default::default()
    }
}
