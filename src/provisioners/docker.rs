/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/provisioners/docker.rs
 * Implements `ContainerEngine` with the `docker` CLI.
 * SPDX-License-Identifier: Apache-2.0 */

use super::common::{capture_command, execute_command, removal_outcome, reports_missing};
use crate::collaborators::ContainerEngine;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

/// What the docker daemon reports for an unknown image reference.
const IMAGE_MISSING: &[&str] = &["No such image"];

/// Container engine backed by the docker CLI.
pub struct DockerCli;

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn ping(&self) -> Result<()> {
        let mut command = Command::new("docker");
        command.args(["info", "--format", "{{.ServerVersion}}"]);
        match capture_command(&mut command).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(Error::EngineUnreachable(output.stderr.trim().to_string())),
            Err(e) => Err(Error::EngineUnreachable(e.to_string())),
        }
    }

    async fn image_exists(&self, reference: &str) -> Result<bool> {
        let mut command = Command::new("docker");
        command.args(["image", "inspect", "--format", "{{.Id}}", reference]);
        let output = capture_command(&mut command).await?;
        if output.success() {
            Ok(true)
        } else if reports_missing(&output.stderr, IMAGE_MISSING) {
            Ok(false)
        } else {
            Err(output.into_error(&command))
        }
    }

    async fn build_image(&self, context: &Path, tag: &str) -> Result<()> {
        let mut command = Command::new("docker");
        command.arg("build").arg("--tag").arg(tag).arg(context);
        execute_command(&mut command).await
    }

    async fn push_image(&self, tag: &str) -> Result<()> {
        let mut command = Command::new("docker");
        command.args(["push", tag]);
        execute_command(&mut command).await
    }

    async fn remove_image(&self, reference: &str) -> Result<()> {
        let mut command = Command::new("docker");
        command.args(["image", "rm", reference]);
        let output = capture_command(&mut command).await?;
        removal_outcome(output, &command, "image", reference, IMAGE_MISSING)
    }
}
