/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/manifests/cache.rs
 * The fixed cache-proxy object set: a pull-through registry mirror, an apt
 * package cache and a squid HTTP proxy. Each workload gets a hostPath
 * PersistentVolume under the node cache mount, a claim bound to it, a single
 * replica Deployment and a ClusterIP Service in the cache namespace.
 * SPDX-License-Identifier: Apache-2.0 */

use super::{labels, ClusterObject};
use crate::collaborators::{ObjectKind, ObjectRef};
use crate::config::{CACHE_NAMESPACE, NODE_CACHE_MOUNT};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, HostPathVolumeSource, PersistentVolume,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource,
    PersistentVolumeSpec, PodSpec, PodTemplateSpec, Probe, Service, ServicePort, ServiceSpec,
    TCPSocketAction, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

const STORAGE_CLASS: &str = "runner-cache";

/// One caching workload.
#[derive(Debug, Clone, Copy)]
pub struct CacheWorkload {
    pub name: &'static str,
    pub image: &'static str,
    pub port: i32,
    /// Where the cache volume is mounted inside the container.
    pub data_path: &'static str,
    pub storage: &'static str,
    pub env: &'static [(&'static str, &'static str)],
}

pub const REGISTRY_MIRROR: CacheWorkload = CacheWorkload {
    name: "registry-mirror",
    image: "registry:2",
    port: 5000,
    data_path: "/var/lib/registry",
    storage: "50Gi",
    env: &[
        ("REGISTRY_PROXY_REMOTEURL", "https://registry-1.docker.io"),
        ("REGISTRY_STORAGE_DELETE_ENABLED", "true"),
    ],
};

pub const APT_CACHE: CacheWorkload = CacheWorkload {
    name: "apt-cacher",
    image: "sameersbn/apt-cacher-ng:latest",
    port: 3142,
    data_path: "/var/cache/apt-cacher-ng",
    storage: "20Gi",
    env: &[],
};

pub const HTTP_PROXY: CacheWorkload = CacheWorkload {
    name: "squid-proxy",
    image: "ubuntu/squid:latest",
    port: 3128,
    data_path: "/var/spool/squid",
    storage: "20Gi",
    env: &[],
};

pub const CACHE_WORKLOADS: [CacheWorkload; 3] = [REGISTRY_MIRROR, APT_CACHE, HTTP_PROXY];

impl CacheWorkload {
    pub fn pv_name(&self) -> String {
        format!("{}-pv", self.name)
    }

    pub fn pvc_name(&self) -> String {
        format!("{}-pvc", self.name)
    }

    /// In-cluster address of the workload's service.
    pub fn service_host(&self) -> String {
        format!("{}.{}.svc.cluster.local:{}", self.name, CACHE_NAMESPACE, self.port)
    }

    pub fn service_url(&self) -> String {
        format!("http://{}", self.service_host())
    }

    /// The objects for this workload, in apply order.
    pub fn objects(&self) -> Vec<ClusterObject> {
        vec![
            ClusterObject::PersistentVolume(self.persistent_volume()),
            ClusterObject::PersistentVolumeClaim(self.claim()),
            ClusterObject::Deployment(self.deployment()),
            ClusterObject::Service(self.service()),
        ]
    }

    /// References to this workload's objects, in removal order.
    pub fn object_refs(&self) -> Vec<ObjectRef> {
        let namespaced = |kind, name: String| ObjectRef {
            kind,
            name,
            namespace: Some(CACHE_NAMESPACE.to_string()),
        };
        vec![
            namespaced(ObjectKind::Service, self.name.to_string()),
            namespaced(ObjectKind::Deployment, self.name.to_string()),
            namespaced(ObjectKind::PersistentVolumeClaim, self.pvc_name()),
            ObjectRef {
                kind: ObjectKind::PersistentVolume,
                name: self.pv_name(),
                namespace: None,
            },
        ]
    }

    fn storage_request(&self) -> BTreeMap<String, Quantity> {
        [("storage".to_string(), Quantity(self.storage.to_string()))].into()
    }

    fn persistent_volume(&self) -> PersistentVolume {
        PersistentVolume {
            metadata: ObjectMeta {
                name: Some(self.pv_name()),
                labels: Some(labels(self.name)),
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec {
                capacity: Some(self.storage_request()),
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                persistent_volume_reclaim_policy: Some("Retain".to_string()),
                storage_class_name: Some(STORAGE_CLASS.to_string()),
                host_path: Some(HostPathVolumeSource {
                    path: format!("{}/{}", NODE_CACHE_MOUNT, self.name),
                    type_: Some("DirectoryOrCreate".to_string()),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn claim(&self) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(self.pvc_name()),
                namespace: Some(CACHE_NAMESPACE.to_string()),
                labels: Some(labels(self.name)),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                storage_class_name: Some(STORAGE_CLASS.to_string()),
                volume_name: Some(self.pv_name()),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(self.storage_request()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn deployment(&self) -> Deployment {
        let pod_labels = labels(self.name);
        let env: Vec<EnvVar> = self
            .env
            .iter()
            .map(|(name, value)| EnvVar {
                name: name.to_string(),
                value: Some(value.to_string()),
                ..Default::default()
            })
            .collect();

        Deployment {
            metadata: ObjectMeta {
                name: Some(self.name.to_string()),
                namespace: Some(CACHE_NAMESPACE.to_string()),
                labels: Some(pod_labels.clone()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                selector: LabelSelector {
                    match_labels: Some(pod_labels.clone()),
                    ..Default::default()
                },
                // The volume is ReadWriteOnce; never run two pods against it.
                strategy: Some(DeploymentStrategy {
                    type_: Some("Recreate".to_string()),
                    ..Default::default()
                }),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(pod_labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: self.name.to_string(),
                            image: Some(self.image.to_string()),
                            env: (!env.is_empty()).then_some(env),
                            ports: Some(vec![ContainerPort {
                                container_port: self.port,
                                protocol: Some("TCP".to_string()),
                                ..Default::default()
                            }]),
                            volume_mounts: Some(vec![VolumeMount {
                                name: "cache".to_string(),
                                mount_path: self.data_path.to_string(),
                                ..Default::default()
                            }]),
                            readiness_probe: Some(Probe {
                                tcp_socket: Some(TCPSocketAction {
                                    port: IntOrString::Int(self.port),
                                    ..Default::default()
                                }),
                                initial_delay_seconds: Some(5),
                                period_seconds: Some(10),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }],
                        volumes: Some(vec![Volume {
                            name: "cache".to_string(),
                            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                                claim_name: self.pvc_name(),
                                read_only: None,
                            }),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn service(&self) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(self.name.to_string()),
                namespace: Some(CACHE_NAMESPACE.to_string()),
                labels: Some(labels(self.name)),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                selector: Some(labels(self.name)),
                ports: Some(vec![ServicePort {
                    port: self.port,
                    target_port: Some(IntOrString::Int(self.port)),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Every object of the cache layer, in apply order.
pub fn cache_objects() -> Vec<ClusterObject> {
    CACHE_WORKLOADS.iter().flat_map(|w| w.objects()).collect()
}
