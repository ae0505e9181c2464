/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/lib.rs
 * Library root of `runner_fleet`: configuration, the reconciliation
 * contract, the collaborator traits with their real implementations, and
 * the `setup`/`teardown` drivers built on them.
 * SPDX-License-Identifier: Apache-2.0 */

pub mod cli;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod manifests;
pub mod provisioners;
pub mod reconcile;
pub mod resources;
pub mod setup;
pub mod steps;
pub mod teardown;
pub mod telemetry;

#[cfg(test)]
mod fakes;

pub use error::{Error, Result};
