/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/collaborators.rs
 * Narrow interfaces over everything outside this process: the local-cluster
 * tool, the chart manager, the Kubernetes API, the container engine and the
 * host itself. Steps only talk to these traits, so the orchestration runs
 * unchanged against the real CLIs or against in-memory fakes.
 * SPDX-License-Identifier: Apache-2.0 */

use crate::error::Result;
use crate::manifests::ClusterObject;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Desired shape of the local k3d cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    pub name: String,
    pub agents: u32,
    /// Host path mounted into every node, with its in-node mount point.
    pub cache_volume: Option<(PathBuf, String)>,
    /// k3d registry the cluster is wired to, as `k3d-<name>:<port>`.
    pub registry: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySpec {
    pub name: String,
    pub port: u16,
}

/// A helm release and the chart it is installed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSpec {
    pub name: String,
    pub namespace: String,
    pub chart: String,
    pub version: Option<String>,
    /// Values document in YAML.
    pub values: Option<String>,
}

impl ReleaseSpec {
    /// Addresses a release that is already installed, for status checks and
    /// removal. It carries no chart, so it must not be installed from.
    pub fn existing(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        ReleaseSpec {
            name: name.into(),
            namespace: namespace.into(),
            chart: String::new(),
            version: None,
            values: None,
        }
    }
}

/// A secret built from literal string fields.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretSpec {
    pub name: String,
    pub namespace: String,
    pub data: BTreeMap<String, String>,
}

impl SecretSpec {
    /// Addresses an existing secret by name without any data.
    pub fn existing(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        SecretSpec {
            name: name.into(),
            namespace: namespace.into(),
            data: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for SecretSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretSpec")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Kinds of cluster objects the cache layer manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    PersistentVolume,
    PersistentVolumeClaim,
    Deployment,
    Service,
}

/// Address of a single cluster object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub name: String,
    /// `None` for cluster-scoped kinds.
    pub namespace: Option<String>,
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{:?} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{:?} {}", self.kind, self.name),
        }
    }
}

/// CLI tools the fleet needs on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Docker,
    K3d,
    Kubectl,
    Helm,
}

impl Tool {
    pub const ALL: [Tool; 4] = [Tool::Docker, Tool::K3d, Tool::Kubectl, Tool::Helm];

    pub fn binary(&self) -> &'static str {
        match self {
            Tool::Docker => "docker",
            Tool::K3d => "k3d",
            Tool::Kubectl => "kubectl",
            Tool::Helm => "helm",
        }
    }

    /// Upstream installation script for the tool.
    pub fn install_script(&self) -> &'static str {
        match self {
            Tool::Docker => "curl -fsSL https://get.docker.com | sh",
            Tool::K3d => {
                "curl -fsSL https://raw.githubusercontent.com/k3d-io/k3d/main/install.sh | bash"
            }
            Tool::Kubectl => {
                "set -e; \
                 arch=$(uname -m | sed -e 's/x86_64/amd64/' -e 's/aarch64/arm64/'); \
                 ver=$(curl -fsSL https://dl.k8s.io/release/stable.txt); \
                 curl -fsSLo /tmp/kubectl \"https://dl.k8s.io/release/${ver}/bin/linux/${arch}/kubectl\"; \
                 install -m 0755 /tmp/kubectl /usr/local/bin/kubectl; \
                 rm -f /tmp/kubectl"
            }
            Tool::Helm => {
                "curl -fsSL https://raw.githubusercontent.com/helm/helm/main/scripts/get-helm-3 | bash"
            }
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

/// Cluster lifecycle, backed by k3d.
#[async_trait]
pub trait ClusterLifecycle: Send + Sync {
    async fn cluster_exists(&self, name: &str) -> Result<bool>;
    async fn create_cluster(&self, spec: &ClusterSpec) -> Result<()>;
    async fn delete_cluster(&self, name: &str) -> Result<()>;
    /// Merges the cluster's credentials into the default kubeconfig and switches to it.
    async fn merge_kubeconfig(&self, name: &str) -> Result<()>;

    async fn registry_exists(&self, name: &str) -> Result<bool>;
    async fn create_registry(&self, spec: &RegistrySpec) -> Result<()>;
    async fn delete_registry(&self, name: &str) -> Result<()>;
}

/// Chart lifecycle, backed by helm.
#[async_trait]
pub trait ChartLifecycle: Send + Sync {
    async fn release_exists(&self, namespace: &str, name: &str) -> Result<bool>;
    async fn install(&self, release: &ReleaseSpec) -> Result<()>;
    async fn upgrade(&self, release: &ReleaseSpec) -> Result<()>;
    async fn uninstall(&self, namespace: &str, name: &str) -> Result<()>;
    async fn list_releases(&self, namespace: &str) -> Result<Vec<String>>;
}

/// Object CRUD and readiness waits against the cluster API.
#[async_trait]
pub trait ClusterObjects: Send + Sync {
    async fn namespace_exists(&self, name: &str) -> Result<bool>;
    async fn create_namespace(&self, name: &str) -> Result<()>;
    /// Deletes the namespace and waits until it is fully gone.
    async fn delete_namespace(&self, name: &str, timeout: Duration) -> Result<()>;

    async fn secret_exists(&self, namespace: &str, name: &str) -> Result<bool>;
    async fn create_secret(&self, secret: &SecretSpec) -> Result<()>;
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()>;

    async fn object_exists(&self, object: &ObjectRef) -> Result<bool>;
    async fn apply(&self, object: &ClusterObject) -> Result<()>;
    async fn delete(&self, object: &ObjectRef) -> Result<()>;

    async fn wait_for_nodes_ready(&self, timeout: Duration) -> Result<()>;
    async fn wait_for_rollout(&self, namespace: &str, deployment: &str, timeout: Duration)
        -> Result<()>;
}

/// The container engine daemon, backed by docker.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn ping(&self) -> Result<()>;
    async fn image_exists(&self, reference: &str) -> Result<bool>;
    async fn build_image(&self, context: &Path, tag: &str) -> Result<()>;
    async fn push_image(&self, tag: &str) -> Result<()>;
    async fn remove_image(&self, reference: &str) -> Result<()>;
}

/// The local machine: tool installation, service account, directories.
#[async_trait]
pub trait HostSystem: Send + Sync {
    fn tool_available(&self, tool: Tool) -> bool;
    async fn install_tool(&self, tool: Tool) -> Result<()>;

    async fn user_exists(&self, name: &str) -> Result<bool>;
    async fn create_user(&self, name: &str, home: &Path) -> Result<()>;
    /// Removes the account together with its home directory.
    async fn delete_user(&self, name: &str) -> Result<()>;

    async fn path_exists(&self, path: &Path) -> Result<bool>;
    /// Creates `path` (and parents) and hands it to `owner`.
    async fn ensure_directory(&self, path: &Path, owner: &str) -> Result<()>;
    async fn remove_directory(&self, path: &Path) -> Result<()>;
}

/// The full set of collaborators a driver run needs.
#[derive(Clone, Copy)]
pub struct Backends<'a> {
    pub clusters: &'a dyn ClusterLifecycle,
    pub charts: &'a dyn ChartLifecycle,
    pub objects: &'a dyn ClusterObjects,
    pub engine: &'a dyn ContainerEngine,
    pub host: &'a dyn HostSystem,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_hides_values() {
        let secret = SecretSpec {
            name: "github-app-secret".into(),
            namespace: "arc-runners".into(),
            data: BTreeMap::from([("github_token".to_string(), "ghp_secret".to_string())]),
        };
        let shown = format!("{:?}", secret);
        assert!(shown.contains("github_token"));
        assert!(!shown.contains("ghp_secret"));
    }

    #[test]
    fn test_existing_specs_address_by_name() {
        let release = ReleaseSpec::existing("arc-runners", "linux");
        assert_eq!((release.namespace.as_str(), release.name.as_str()), ("arc-runners", "linux"));
        assert_eq!(release.version, None);
        assert_eq!(release.values, None);

        let secret = SecretSpec::existing("arc-runners", "github-app-secret");
        assert_eq!(secret.name, "github-app-secret");
        assert!(secret.data.is_empty());
    }

    #[test]
    fn test_object_ref_display() {
        let pv = ObjectRef {
            kind: ObjectKind::PersistentVolume,
            name: "squid-proxy-pv".into(),
            namespace: None,
        };
        assert_eq!(pv.to_string(), "PersistentVolume squid-proxy-pv");
        let svc = ObjectRef {
            kind: ObjectKind::Service,
            name: "squid-proxy".into(),
            namespace: Some("cache-system".into()),
        };
        assert_eq!(svc.to_string(), "Service cache-system/squid-proxy");
    }
}
