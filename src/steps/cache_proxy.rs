/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/steps/cache_proxy.rs
 * Brings up the caching layer: host directories behind the node mount, the
 * cache namespace and the fixed workload set, then waits for each workload
 * to roll out.
 * SPDX-License-Identifier: Apache-2.0 */

use super::{NAMESPACE_DELETE_TIMEOUT, ROLLOUT_TIMEOUT};
use crate::collaborators::Backends;
use crate::config::{Settings, CACHE_NAMESPACE};
use crate::error::Result;
use crate::manifests::cache::{cache_objects, CACHE_WORKLOADS};
use crate::reconcile::ensure;
use crate::resources::{DirectoryResource, NamespaceResource, ObjectResource};
use tracing::{debug, info};

pub async fn run(settings: &Settings, backends: Backends<'_>) -> Result<()> {
    if !settings.enable_cache_proxy {
        debug!("Cache proxy disabled");
        return Ok(());
    }
    info!("Provisioning cache proxy in {}", CACHE_NAMESPACE);

    for path in settings.cache_subdirs() {
        ensure(&DirectoryResource {
            host: backends.host,
            path,
            owner: settings.runner_user.clone(),
        })
        .await?;
    }

    ensure(&NamespaceResource {
        objects: backends.objects,
        name: CACHE_NAMESPACE.to_string(),
        deletion_timeout: NAMESPACE_DELETE_TIMEOUT,
    })
    .await?;

    for object in cache_objects() {
        ensure(&ObjectResource::desired(backends.objects, object)).await?;
    }

    for workload in CACHE_WORKLOADS.iter() {
        backends
            .objects
            .wait_for_rollout(CACHE_NAMESPACE, workload.name, ROLLOUT_TIMEOUT)
            .await?;
        info!("{} is available at {}", workload.name, workload.service_url());
    }
    Ok(())
}
