/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/steps/runner_image.rs
 * Builds a custom runner image when a build context is configured and
 * publishes it to a k3d-managed registry the cluster pulls from.
 * SPDX-License-Identifier: Apache-2.0 */

use crate::collaborators::{Backends, RegistrySpec};
use crate::config::Settings;
use crate::error::Result;
use crate::reconcile::ensure;
use crate::resources::{ImageResource, RegistryResource};
use tracing::info;

/// The registry the cluster is wired to, when the image is built locally.
pub fn registry_ref(settings: &Settings) -> Option<String> {
    settings
        .runner_image_context
        .as_ref()
        .map(|_| format!("k3d-{}:{}", settings.registry_name, settings.registry_port))
}

pub fn registry_spec(settings: &Settings) -> RegistrySpec {
    RegistrySpec {
        name: settings.registry_name.clone(),
        port: settings.registry_port,
    }
}

pub async fn run(settings: &Settings, backends: Backends<'_>) -> Result<()> {
    let image = settings.runner_image();
    let Some(context) = image.build_context else {
        info!("Using upstream runner image {}", image.cluster_ref);
        return Ok(());
    };

    ensure(&RegistryResource {
        clusters: backends.clusters,
        spec: registry_spec(settings),
    })
    .await?;
    ensure(&ImageResource {
        engine: backends.engine,
        tag: image.host_ref,
        context: Some(context),
    })
    .await?;
    info!("Runner pods will pull {}", image.cluster_ref);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{settings, FakeWorld};

    #[tokio::test]
    async fn test_upstream_image_needs_nothing() {
        let world = FakeWorld::new();
        let s = settings("GITHUB_ORG=acme");
        run(&s, world.backends()).await.unwrap();
        assert!(world.journal().is_empty());
        assert_eq!(registry_ref(&s), None);
    }

    #[tokio::test]
    async fn test_local_build_goes_through_registry() {
        let world = FakeWorld::new();
        let s = settings("GITHUB_ORG=acme\nRUNNER_IMAGE=fleet-runner:2\nRUNNER_IMAGE_CONTEXT=/srv/img");
        run(&s, world.backends()).await.unwrap();

        assert!(world.performed("create_registry arc-registry"));
        assert!(world.performed("build_image localhost:5000/fleet-runner:2 /srv/img"));
        assert!(world.performed("push_image localhost:5000/fleet-runner:2"));
        assert_eq!(registry_ref(&s).as_deref(), Some("k3d-arc-registry:5000"));
    }
}
