/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/steps/service_user.rs
 * Ensures the unprivileged runner account, its home and the cache root.
 * SPDX-License-Identifier: Apache-2.0 */

use crate::collaborators::Backends;
use crate::config::Settings;
use crate::error::Result;
use crate::reconcile::ensure;
use crate::resources::{DirectoryResource, ServiceAccountResource};

pub async fn run(settings: &Settings, backends: Backends<'_>) -> Result<()> {
    ensure(&ServiceAccountResource {
        host: backends.host,
        name: settings.runner_user.clone(),
        home: settings.runner_home.clone(),
    })
    .await?;

    for path in [&settings.runner_home, &settings.cache_dir] {
        ensure(&DirectoryResource {
            host: backends.host,
            path: path.clone(),
            owner: settings.runner_user.clone(),
        })
        .await?;
    }
    Ok(())
}
