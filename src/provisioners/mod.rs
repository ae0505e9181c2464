/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/provisioners/mod.rs
 * Concrete collaborators that drive the real tools on this machine.
 * SPDX-License-Identifier: Apache-2.0 */

pub mod common;
pub mod docker;
pub mod helm;
pub mod host;
pub mod k3d;
pub mod kubernetes;

use crate::collaborators::Backends;
use crate::config::Settings;

/// Owns one instance of every real collaborator for a run.
pub struct LocalBackends {
    k3d: k3d::K3dCli,
    helm: helm::HelmCli,
    kube: kubernetes::KubeApiObjects,
    docker: docker::DockerCli,
    host: host::LocalHost,
}

impl LocalBackends {
    pub fn new(settings: &Settings) -> Self {
        Self {
            k3d: k3d::K3dCli,
            helm: helm::HelmCli,
            kube: kubernetes::KubeApiObjects::new(settings.kube_context()),
            docker: docker::DockerCli,
            host: host::LocalHost,
        }
    }

    pub fn backends(&self) -> Backends<'_> {
        Backends {
            clusters: &self.k3d,
            charts: &self.helm,
            objects: &self.kube,
            engine: &self.docker,
            host: &self.host,
        }
    }
}
