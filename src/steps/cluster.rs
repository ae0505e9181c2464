/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/steps/cluster.rs
 * Ensures the k3d cluster, points the kubeconfig at it and waits for its
 * nodes.
 * SPDX-License-Identifier: Apache-2.0 */

use super::{runner_image, NODE_READY_TIMEOUT};
use crate::collaborators::{Backends, ClusterSpec};
use crate::config::{Settings, NODE_CACHE_MOUNT};
use crate::error::Result;
use crate::reconcile::{ensure, Outcome};
use crate::resources::ClusterResource;
use tracing::{info, warn};

pub fn cluster_spec(settings: &Settings) -> ClusterSpec {
    ClusterSpec {
        name: settings.cluster_name.clone(),
        agents: settings.agents,
        cache_volume: settings
            .enable_cache_proxy
            .then(|| (settings.cache_dir.clone(), NODE_CACHE_MOUNT.to_string())),
        registry: runner_image::registry_ref(settings),
    }
}

/// Cluster options k3d only applies at creation time. An existing cluster
/// may have been created without them.
pub fn creation_time_options(settings: &Settings) -> Vec<String> {
    let mut options = Vec::new();
    if settings.enable_cache_proxy {
        options.push(format!("the cache mount {}", NODE_CACHE_MOUNT));
    }
    if let Some(registry) = runner_image::registry_ref(settings) {
        options.push(format!("access to the registry {}", registry));
    }
    options
}

pub async fn run(settings: &Settings, backends: Backends<'_>) -> Result<()> {
    let outcome = ensure(&ClusterResource {
        clusters: backends.clusters,
        spec: cluster_spec(settings),
    })
    .await?;
    if outcome == Outcome::Unchanged {
        for option in creation_time_options(settings) {
            warn!(
                "Cluster {} already existed; {} is only present if it was created with it",
                settings.cluster_name, option
            );
        }
    }

    backends.clusters.merge_kubeconfig(&settings.cluster_name).await?;
    info!("Waiting for nodes of {} to become Ready", settings.kube_context());
    backends.objects.wait_for_nodes_ready(NODE_READY_TIMEOUT).await
}
