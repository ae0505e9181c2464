/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/steps/prerequisites.rs
 * Makes sure docker, k3d, kubectl and helm are on PATH and that the
 * container engine answers.
 * SPDX-License-Identifier: Apache-2.0 */

use crate::collaborators::{Backends, Tool};
use crate::error::Result;
use crate::reconcile::ensure;
use crate::resources::ToolResource;
use tracing::info;

pub async fn run(backends: Backends<'_>) -> Result<()> {
    info!("Checking prerequisites");
    for tool in Tool::ALL {
        ensure(&ToolResource {
            host: backends.host,
            tool,
        })
        .await?;
    }
    backends.engine.ping().await?;
    info!("Container engine is reachable");
    Ok(())
}
