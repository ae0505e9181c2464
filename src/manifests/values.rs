/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/manifests/values.rs
 * Renders the helm values for the runner scale-set chart. The runner pod is
 * spelled out as a runner container plus a docker-in-docker sidecar so the
 * cache layer can hand the sidecar a registry mirror. The cache-proxy flag is
 * the only conditional.
 * SPDX-License-Identifier: Apache-2.0 */

use super::cache::{HTTP_PROXY, REGISTRY_MIRROR};
use crate::config::{Settings, CONTROLLER_NAMESPACE, CONTROLLER_RELEASE, CREDENTIAL_SECRET_NAME};
use crate::error::Result;
use serde_json::{json, Value};

const DIND_IMAGE: &str = "docker:dind";
const NO_PROXY: &str =
    "localhost,127.0.0.1,.svc,.svc.cluster.local,.cluster.local,10.0.0.0/8,172.16.0.0/12";

/// Name of the controller deployment and service account the chart creates.
pub fn controller_service_account() -> String {
    format!("{}-gha-rs-controller", CONTROLLER_RELEASE)
}

/// Proxy variables injected into the runner container when caching is on.
pub fn proxy_env(settings: &Settings) -> Vec<(String, String)> {
    if !settings.enable_cache_proxy {
        return Vec::new();
    }
    let proxy = HTTP_PROXY.service_url();
    let mut vars = Vec::new();
    for (name, value) in [
        ("HTTP_PROXY", proxy.as_str()),
        ("HTTPS_PROXY", proxy.as_str()),
        ("NO_PROXY", NO_PROXY),
    ] {
        vars.push((name.to_string(), value.to_string()));
        vars.push((name.to_ascii_lowercase(), value.to_string()));
    }
    vars
}

fn env_list(vars: &[(String, String)]) -> Vec<Value> {
    vars.iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect()
}

/// Builds the scale-set values document.
pub fn scale_set_values(settings: &Settings) -> Value {
    let image = settings.runner_image().cluster_ref;

    let mut runner_env = vec![("DOCKER_HOST".to_string(), "unix:///var/run/docker.sock".to_string())];
    runner_env.extend(proxy_env(settings));

    let mut dind_args = vec![
        "dockerd".to_string(),
        "--host=unix:///var/run/docker.sock".to_string(),
        "--group=$(DOCKER_GROUP_GID)".to_string(),
    ];
    if settings.enable_cache_proxy {
        dind_args.push(format!("--registry-mirror={}", REGISTRY_MIRROR.service_url()));
        dind_args.push(format!("--insecure-registry={}", REGISTRY_MIRROR.service_host()));
    }

    json!({
        "githubConfigUrl": settings.target_url(),
        "githubConfigSecret": CREDENTIAL_SECRET_NAME,
        "runnerScaleSetName": settings.scale_set_name,
        "minRunners": settings.min_runners,
        "maxRunners": settings.max_runners,
        "controllerServiceAccount": {
            "namespace": CONTROLLER_NAMESPACE,
            "name": controller_service_account(),
        },
        "template": {
            "spec": {
                "initContainers": [{
                    "name": "init-dind-externals",
                    "image": image,
                    "command": ["cp", "-r", "/home/runner/externals/.", "/home/runner/tmpDir/"],
                    "volumeMounts": [{ "name": "dind-externals", "mountPath": "/home/runner/tmpDir" }],
                }],
                "containers": [
                    {
                        "name": "runner",
                        "image": image,
                        "command": ["/home/runner/run.sh"],
                        "env": env_list(&runner_env),
                        "volumeMounts": [
                            { "name": "work", "mountPath": "/home/runner/_work" },
                            { "name": "dind-sock", "mountPath": "/var/run" },
                        ],
                    },
                    {
                        "name": "dind",
                        "image": DIND_IMAGE,
                        "args": dind_args,
                        "env": [{ "name": "DOCKER_GROUP_GID", "value": "123" }],
                        "securityContext": { "privileged": true },
                        "volumeMounts": [
                            { "name": "work", "mountPath": "/home/runner/_work" },
                            { "name": "dind-sock", "mountPath": "/var/run" },
                            { "name": "dind-externals", "mountPath": "/home/runner/externals" },
                        ],
                    },
                ],
                "volumes": [
                    { "name": "work", "emptyDir": {} },
                    { "name": "dind-sock", "emptyDir": {} },
                    { "name": "dind-externals", "emptyDir": {} },
                ],
            }
        }
    })
}

/// The scale-set values document as YAML for `helm --values`.
pub fn render_scale_set_values(settings: &Settings) -> Result<String> {
    Ok(serde_yaml::to_string(&scale_set_values(settings))?)
}
