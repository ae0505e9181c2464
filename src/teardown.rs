/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/teardown.rs
 * The `teardown` driver. The phase list is fixed from the command-line
 * flags before anything runs; each phase converges its resources to absent
 * and treats "not found" as done.
 * SPDX-License-Identifier: Apache-2.0 */

use crate::collaborators::{Backends, ObjectRef, ReleaseSpec, SecretSpec};
use crate::config::{
    Settings, CACHE_NAMESPACE, CONTROLLER_NAMESPACE, CREDENTIAL_SECRET_NAME,
};
use crate::error::Result;
use crate::manifests::cache::CACHE_WORKLOADS;
use crate::reconcile::ensure_absent;
use crate::resources::{
    ClusterResource, DirectoryResource, ImageResource, NamespaceResource, ObjectResource,
    RegistryResource, ReleaseResource, SecretResource, ServiceAccountResource,
};
use crate::steps::{cluster, controller, runner_image, NAMESPACE_DELETE_TIMEOUT};
use std::fmt;
use tracing::info;

/// One stage of teardown, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    ScaleSets,
    Controller,
    CacheLayer,
    Cluster,
    Artifacts,
    ServiceUser,
}

impl Phase {
    const ORDER: [Phase; 6] = [
        Phase::ScaleSets,
        Phase::Controller,
        Phase::CacheLayer,
        Phase::Cluster,
        Phase::Artifacts,
        Phase::ServiceUser,
    ];

    /// Phases that talk to the cluster API and need a running cluster.
    fn in_cluster(self) -> bool {
        matches!(self, Phase::ScaleSets | Phase::Controller | Phase::CacheLayer)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::ScaleSets => "runner scale sets",
            Phase::Controller => "runner controller",
            Phase::CacheLayer => "cache proxy",
            Phase::Cluster => "cluster",
            Phase::Artifacts => "registry, images and cache directories",
            Phase::ServiceUser => "service account",
        };
        f.write_str(name)
    }
}

/// What the user asked to keep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownOptions {
    pub keep_cluster: bool,
    pub keep_registry: bool,
    pub keep_user: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownPlan {
    phases: Vec<Phase>,
}

impl TeardownPlan {
    pub fn from_options(options: &TeardownOptions) -> Self {
        let phases = Phase::ORDER
            .into_iter()
            .filter(|phase| match phase {
                Phase::Cluster => !options.keep_cluster,
                Phase::Artifacts => !options.keep_registry,
                Phase::ServiceUser => !options.keep_user,
                _ => true,
            })
            .collect();
        Self { phases }
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }
}

pub async fn run_teardown(
    settings: &Settings,
    plan: &TeardownPlan,
    backends: Backends<'_>,
) -> Result<()> {
    let cluster_present = backends
        .clusters
        .cluster_exists(&settings.cluster_name)
        .await?;
    if cluster_present {
        backends
            .clusters
            .merge_kubeconfig(&settings.cluster_name)
            .await?;
    }

    for &phase in plan.phases() {
        if phase.in_cluster() && !cluster_present {
            info!(
                "Cluster {} is absent; {} already gone",
                settings.cluster_name, phase
            );
            continue;
        }
        info!("Tearing down {}", phase);
        match phase {
            Phase::ScaleSets => remove_scale_sets(settings, backends).await?,
            Phase::Controller => remove_controller(settings, backends).await?,
            Phase::CacheLayer => remove_cache_layer(backends).await?,
            Phase::Cluster => {
                ensure_absent(&ClusterResource {
                    clusters: backends.clusters,
                    spec: cluster::cluster_spec(settings),
                })
                .await?;
            }
            Phase::Artifacts => remove_artifacts(settings, backends).await?,
            Phase::ServiceUser => remove_service_user(settings, backends).await?,
        }
    }
    info!("Teardown complete");
    Ok(())
}

fn namespace<'a>(backends: Backends<'a>, name: &str) -> NamespaceResource<'a> {
    NamespaceResource {
        objects: backends.objects,
        name: name.to_string(),
        deletion_timeout: NAMESPACE_DELETE_TIMEOUT,
    }
}

async fn remove_scale_sets(settings: &Settings, backends: Backends<'_>) -> Result<()> {
    let namespace_name = settings.runner_namespace.as_str();
    for release in backends.charts.list_releases(namespace_name).await? {
        ensure_absent(&ReleaseResource {
            charts: backends.charts,
            spec: ReleaseSpec::existing(namespace_name, release),
        })
        .await?;
    }
    ensure_absent(&SecretResource {
        objects: backends.objects,
        spec: SecretSpec::existing(namespace_name, CREDENTIAL_SECRET_NAME),
    })
    .await?;
    ensure_absent(&namespace(backends, namespace_name)).await?;
    Ok(())
}

async fn remove_controller(settings: &Settings, backends: Backends<'_>) -> Result<()> {
    ensure_absent(&ReleaseResource {
        charts: backends.charts,
        spec: controller::release_spec(settings),
    })
    .await?;
    ensure_absent(&namespace(backends, CONTROLLER_NAMESPACE)).await?;
    Ok(())
}

async fn remove_cache_layer(backends: Backends<'_>) -> Result<()> {
    // Claims and workloads go before the volumes they bind.
    let (namespaced, cluster_scoped): (Vec<ObjectRef>, Vec<ObjectRef>) = CACHE_WORKLOADS
        .iter()
        .flat_map(|w| w.object_refs())
        .partition(|r| r.namespace.is_some());
    for target in namespaced.into_iter().chain(cluster_scoped) {
        ensure_absent(&ObjectResource::existing(backends.objects, target)).await?;
    }
    ensure_absent(&namespace(backends, CACHE_NAMESPACE)).await?;
    Ok(())
}

async fn remove_artifacts(settings: &Settings, backends: Backends<'_>) -> Result<()> {
    let image = settings.runner_image();
    if image.build_context.is_some() {
        ensure_absent(&ImageResource {
            engine: backends.engine,
            tag: image.host_ref,
            context: None,
        })
        .await?;
    }
    ensure_absent(&RegistryResource {
        clusters: backends.clusters,
        spec: runner_image::registry_spec(settings),
    })
    .await?;
    ensure_absent(&DirectoryResource {
        host: backends.host,
        path: settings.cache_dir.clone(),
        owner: settings.runner_user.clone(),
    })
    .await?;
    Ok(())
}

async fn remove_service_user(settings: &Settings, backends: Backends<'_>) -> Result<()> {
    ensure_absent(&ServiceAccountResource {
        host: backends.host,
        name: settings.runner_user.clone(),
        home: settings.runner_home.clone(),
    })
    .await?;
    ensure_absent(&DirectoryResource {
        host: backends.host,
        path: settings.runner_home.clone(),
        owner: settings.runner_user.clone(),
    })
    .await?;
    Ok(())
}
