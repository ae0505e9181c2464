/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/provisioners/helm.rs
 * Implements `ChartLifecycle` with the `helm` CLI. Values documents are
 * written to a temporary file that lives for the duration of the call.
 * SPDX-License-Identifier: Apache-2.0 */

use super::common::{
    capture_command, execute_command, removal_outcome, reports_missing, run_captured,
};
use crate::collaborators::{ChartLifecycle, ReleaseSpec};
use crate::error::Result;
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::process::Command;

/// What helm prints when the named release does not exist.
const RELEASE_MISSING: &[&str] = &["release: not found"];

/// Arguments shared by `helm install` and `helm upgrade`.
fn release_args(verb: &str, release: &ReleaseSpec, values_file: Option<&Path>) -> Vec<String> {
    let mut args = vec![
        verb.to_string(),
        release.name.clone(),
        release.chart.clone(),
        "--namespace".to_string(),
        release.namespace.clone(),
    ];
    if let Some(version) = &release.version {
        args.push("--version".to_string());
        args.push(version.clone());
    }
    if let Some(path) = values_file {
        args.push("--values".to_string());
        args.push(path.display().to_string());
    }
    args
}

fn write_values(values: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("runner-fleet-values-")
        .suffix(".yaml")
        .tempfile()?;
    file.write_all(values.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// Chart lifecycle backed by the helm CLI.
pub struct HelmCli;

impl HelmCli {
    async fn run_release(&self, verb: &str, release: &ReleaseSpec) -> Result<()> {
        // Keep the file alive until helm has read it.
        let values_file = release.values.as_deref().map(write_values).transpose()?;
        let mut command = Command::new("helm");
        command.args(release_args(
            verb,
            release,
            values_file.as_ref().map(|f| f.path()),
        ));
        execute_command(&mut command).await
    }
}

#[async_trait]
impl ChartLifecycle for HelmCli {
    async fn release_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        let mut command = Command::new("helm");
        command.args(["status", name, "--namespace", namespace]);
        let output = capture_command(&mut command).await?;
        if output.success() {
            Ok(true)
        } else if reports_missing(&output.stderr, RELEASE_MISSING) {
            Ok(false)
        } else {
            Err(output.into_error(&command))
        }
    }

    async fn install(&self, release: &ReleaseSpec) -> Result<()> {
        self.run_release("install", release).await
    }

    async fn upgrade(&self, release: &ReleaseSpec) -> Result<()> {
        self.run_release("upgrade", release).await
    }

    async fn uninstall(&self, namespace: &str, name: &str) -> Result<()> {
        let mut command = Command::new("helm");
        command.args(["uninstall", name, "--namespace", namespace, "--wait"]);
        let output = capture_command(&mut command).await?;
        removal_outcome(output, &command, "helm release", name, RELEASE_MISSING)
    }

    async fn list_releases(&self, namespace: &str) -> Result<Vec<String>> {
        let mut command = Command::new("helm");
        command.args(["list", "--namespace", namespace, "--short"]);
        let stdout = run_captured(&mut command).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}
