/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/steps/scale_set.rs
 * Installs or upgrades the runner scale set, the `runs-on` target
 * workflows select.
 * SPDX-License-Identifier: Apache-2.0 */

use super::SCALE_SET_CHART;
use crate::collaborators::{Backends, ReleaseSpec};
use crate::config::Settings;
use crate::error::Result;
use crate::manifests::values::render_scale_set_values;
use crate::reconcile::ensure;
use crate::resources::ReleaseResource;
use tracing::info;

pub fn release_spec(settings: &Settings) -> Result<ReleaseSpec> {
    Ok(ReleaseSpec {
        name: settings.scale_set_name.clone(),
        namespace: settings.runner_namespace.clone(),
        chart: SCALE_SET_CHART.to_string(),
        version: settings.chart_version.clone(),
        values: Some(render_scale_set_values(settings)?),
    })
}

pub async fn run(settings: &Settings, backends: Backends<'_>) -> Result<()> {
    ensure(&ReleaseResource {
        charts: backends.charts,
        spec: release_spec(settings)?,
    })
    .await?;
    info!(
        "Runner scale set {} registered for {} ({}..{} runners)",
        settings.scale_set_name,
        settings.target_url(),
        settings.min_runners,
        settings.max_runners
    );
    info!("Target it from workflows with `runs-on: {}`", settings.scale_set_name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::settings;

    #[test]
    fn test_release_is_named_after_scale_set() {
        let spec = release_spec(&settings(
            "GITHUB_ORG=acme\nRUNNER_SCALE_SET_NAME=linux-x64\nRUNNER_NAMESPACE=ci",
        ))
        .unwrap();
        assert_eq!(spec.name, "linux-x64");
        assert_eq!(spec.namespace, "ci");
        assert!(spec.chart.ends_with("/gha-runner-scale-set"));
        let values = spec.values.unwrap();
        assert!(values.contains("runnerScaleSetName: linux-x64"));
    }
}
