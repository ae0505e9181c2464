/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/steps/mod.rs
 * The provisioning steps `setup` runs in order. Each one converges a slice
 * of the fleet through `reconcile::ensure` and is safe to rerun.
 * SPDX-License-Identifier: Apache-2.0 */

pub mod cache_proxy;
pub mod cluster;
pub mod controller;
pub mod credentials;
pub mod prerequisites;
pub mod runner_image;
pub mod scale_set;
pub mod service_user;

use std::time::Duration;

/// How long cluster nodes get to report Ready.
pub const NODE_READY_TIMEOUT: Duration = Duration::from_secs(180);
/// How long a deployment gets to roll out.
pub const ROLLOUT_TIMEOUT: Duration = Duration::from_secs(300);
/// How long a deleted namespace gets to finish terminating.
pub const NAMESPACE_DELETE_TIMEOUT: Duration = Duration::from_secs(180);

pub const CONTROLLER_CHART: &str =
    "oci://ghcr.io/actions/actions-runner-controller-charts/gha-runner-scale-set-controller";
pub const SCALE_SET_CHART: &str =
    "oci://ghcr.io/actions/actions-runner-controller-charts/gha-runner-scale-set";
