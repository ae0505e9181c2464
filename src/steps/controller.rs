/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/steps/controller.rs
 * Installs or upgrades the runner controller chart and waits for the
 * controller deployment.
 * SPDX-License-Identifier: Apache-2.0 */

use super::{CONTROLLER_CHART, NAMESPACE_DELETE_TIMEOUT, ROLLOUT_TIMEOUT};
use crate::collaborators::{Backends, ReleaseSpec};
use crate::config::{Settings, CONTROLLER_NAMESPACE, CONTROLLER_RELEASE};
use crate::error::Result;
use crate::manifests::values::controller_service_account;
use crate::reconcile::ensure;
use crate::resources::{NamespaceResource, ReleaseResource};

pub fn release_spec(settings: &Settings) -> ReleaseSpec {
    ReleaseSpec {
        name: CONTROLLER_RELEASE.to_string(),
        namespace: CONTROLLER_NAMESPACE.to_string(),
        chart: CONTROLLER_CHART.to_string(),
        version: settings.chart_version.clone(),
        values: None,
    }
}

pub async fn run(settings: &Settings, backends: Backends<'_>) -> Result<()> {
    ensure(&NamespaceResource {
        objects: backends.objects,
        name: CONTROLLER_NAMESPACE.to_string(),
        deletion_timeout: NAMESPACE_DELETE_TIMEOUT,
    })
    .await?;
    ensure(&ReleaseResource {
        charts: backends.charts,
        spec: release_spec(settings),
    })
    .await?;
    backends
        .objects
        .wait_for_rollout(
            CONTROLLER_NAMESPACE,
            &controller_service_account(),
            ROLLOUT_TIMEOUT,
        )
        .await
}
