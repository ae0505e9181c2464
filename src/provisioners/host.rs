/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/provisioners/host.rs
 * Implements `HostSystem` for the local Linux machine: tool lookup and
 * installation, the runner service account, and cache directories.
 * SPDX-License-Identifier: Apache-2.0 */

use super::common::{capture_command, execute_command, removal_outcome, run_captured};
use crate::collaborators::{HostSystem, Tool};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// What `userdel` prints when the account does not exist.
fn user_missing(name: &str) -> String {
    format!("user '{}' does not exist", name)
}

/// The host this process runs on.
pub struct LocalHost;

#[async_trait]
impl HostSystem for LocalHost {
    fn tool_available(&self, tool: Tool) -> bool {
        which::which(tool.binary()).is_ok()
    }

    async fn install_tool(&self, tool: Tool) -> Result<()> {
        let mut command = Command::new("sh");
        command.args(["-c", tool.install_script()]);
        execute_command(&mut command)
            .await
            .map_err(|e| Error::MissingTool {
                tool: tool.to_string(),
                reason: e.to_string(),
            })
    }

    async fn user_exists(&self, name: &str) -> Result<bool> {
        let mut command = Command::new("id");
        command.args(["-u", name]);
        Ok(capture_command(&mut command).await?.success())
    }

    async fn create_user(&self, name: &str, home: &Path) -> Result<()> {
        let mut command = Command::new("useradd");
        command
            .args(["--system", "--create-home", "--user-group", "--shell", "/bin/bash"])
            .arg("--home-dir")
            .arg(home)
            .arg(name);
        run_captured(&mut command).await?;

        // Runners drive the engine, so join its group when there is one.
        let mut group = Command::new("getent");
        group.args(["group", "docker"]);
        if capture_command(&mut group).await?.success() {
            let mut command = Command::new("usermod");
            command.args(["--append", "--groups", "docker", name]);
            run_captured(&mut command).await?;
        } else {
            debug!("No docker group on this host; {} not added to it", name);
        }
        Ok(())
    }

    async fn delete_user(&self, name: &str) -> Result<()> {
        let mut command = Command::new("userdel");
        command.args(["--remove", name]);
        let output = capture_command(&mut command).await?;
        let missing = user_missing(name);
        removal_outcome(output, &command, "user", name, &[missing.as_str()])
    }

    async fn path_exists(&self, path: &Path) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn ensure_directory(&self, path: &Path, owner: &str) -> Result<()> {
        tokio::fs::create_dir_all(path).await?;
        let mut command = Command::new("chown");
        command
            .arg("-R")
            .arg(format!("{}:{}", owner, owner))
            .arg(path);
        run_captured(&mut command).await.map(|_| ())
    }

    async fn remove_directory(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::not_found("directory", path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
