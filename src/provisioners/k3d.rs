/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/provisioners/k3d.rs
 * Implements `ClusterLifecycle` with the `k3d` CLI: clusters, kubeconfig
 * merging and the local image registry.
 * SPDX-License-Identifier: Apache-2.0 */

use super::common::{capture_command, execute_command, removal_outcome, run_captured};
use crate::collaborators::{ClusterLifecycle, ClusterSpec, RegistrySpec};
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

/// The fields of `k3d ... list -o json` entries this tool reads.
#[derive(Deserialize, Debug)]
struct Listed {
    name: String,
}

/// What k3d prints when the named cluster or registry has no nodes.
const CLUSTER_MISSING: &[&str] = &["No nodes found for given cluster"];
const REGISTRY_MISSING: &[&str] = &["No nodes found for registry", "No nodes found for given registry"];

/// k3d prefixes the container name of every registry it manages.
fn registry_container(name: &str) -> String {
    if name.starts_with("k3d-") {
        name.to_string()
    } else {
        format!("k3d-{}", name)
    }
}

fn listed_names(json: &str) -> Result<Vec<String>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<Listed> = serde_json::from_str(json)?;
    Ok(entries.into_iter().map(|e| e.name).collect())
}

/// Builds the `k3d cluster create` invocation for `spec`.
fn create_args(spec: &ClusterSpec) -> Vec<String> {
    let mut args = vec![
        "cluster".to_string(),
        "create".to_string(),
        spec.name.clone(),
        "--agents".to_string(),
        spec.agents.to_string(),
        "--wait".to_string(),
        "--kubeconfig-update-default=false".to_string(),
        "--kubeconfig-switch-context=false".to_string(),
    ];
    if let Some((host_path, mount)) = &spec.cache_volume {
        args.push("--volume".to_string());
        args.push(format!("{}:{}@all", host_path.display(), mount));
    }
    if let Some(registry) = &spec.registry {
        args.push("--registry-use".to_string());
        args.push(registry.clone());
    }
    args
}

/// Cluster lifecycle backed by the k3d CLI.
pub struct K3dCli;

#[async_trait]
impl ClusterLifecycle for K3dCli {
    async fn cluster_exists(&self, name: &str) -> Result<bool> {
        let mut command = Command::new("k3d");
        command.args(["cluster", "list", "-o", "json"]);
        let names = listed_names(&run_captured(&mut command).await?)?;
        Ok(names.iter().any(|n| n == name))
    }

    /// Creates the cluster via `k3d cluster create <name> ...`, streaming progress.
    async fn create_cluster(&self, spec: &ClusterSpec) -> Result<()> {
        let mut command = Command::new("k3d");
        command.args(create_args(spec));
        execute_command(&mut command).await
    }

    async fn delete_cluster(&self, name: &str) -> Result<()> {
        let mut command = Command::new("k3d");
        command.args(["cluster", "delete", name]);
        let output = capture_command(&mut command).await?;
        removal_outcome(output, &command, "cluster", name, CLUSTER_MISSING)
    }

    async fn merge_kubeconfig(&self, name: &str) -> Result<()> {
        let mut command = Command::new("k3d");
        command.args([
            "kubeconfig",
            "merge",
            name,
            "--kubeconfig-merge-default",
            "--kubeconfig-switch-context",
        ]);
        run_captured(&mut command).await.map(|_| ())
    }

    async fn registry_exists(&self, name: &str) -> Result<bool> {
        let mut command = Command::new("k3d");
        command.args(["registry", "list", "-o", "json"]);
        let wanted = registry_container(name);
        let names = listed_names(&run_captured(&mut command).await?)?;
        Ok(names.iter().any(|n| *n == wanted))
    }

    async fn create_registry(&self, spec: &RegistrySpec) -> Result<()> {
        let mut command = Command::new("k3d");
        command.args(["registry", "create", &spec.name, "--port", &spec.port.to_string()]);
        execute_command(&mut command).await
    }

    async fn delete_registry(&self, name: &str) -> Result<()> {
        let mut command = Command::new("k3d");
        command.args(["registry", "delete", &registry_container(name)]);
        let output = capture_command(&mut command).await?;
        removal_outcome(output, &command, "registry", name, REGISTRY_MISSING)
    }
}
