/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/setup.rs
 * The `setup` driver: validates the configuration, then runs every
 * provisioning step in dependency order.
 * SPDX-License-Identifier: Apache-2.0 */

use crate::collaborators::Backends;
use crate::config::Settings;
use crate::error::Result;
use crate::steps;
use tracing::info;

/// Provisions the whole fleet. Safe to rerun; a rerun only upgrades.
pub async fn run_setup(settings: &Settings, backends: Backends<'_>) -> Result<()> {
    // Nothing below runs unless the credentials are complete.
    let auth = settings.validate()?;
    info!(
        "Provisioning runner fleet for {} using {} authentication",
        settings.target_url(),
        auth.mode()
    );

    steps::prerequisites::run(backends).await?;
    steps::service_user::run(settings, backends).await?;
    steps::runner_image::run(settings, backends).await?;
    steps::cluster::run(settings, backends).await?;
    steps::cache_proxy::run(settings, backends).await?;
    steps::controller::run(settings, backends).await?;
    steps::credentials::run(settings, &auth, backends).await?;
    steps::scale_set::run(settings, backends).await?;

    info!("Runner fleet is ready");
    Ok(())
}
