/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/manifests/mod.rs
 * Documents this tool produces: the cache-proxy object set and the helm
 * values for the runner scale set.
 * SPDX-License-Identifier: Apache-2.0 */

pub mod cache;
pub mod values;

use crate::collaborators::{ObjectKind, ObjectRef};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim, Service};
use std::collections::BTreeMap;

/// Field manager and `managed-by` label value for everything applied here.
pub const FIELD_MANAGER: &str = "runner-fleet";

/// A typed object applied with server-side apply.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterObject {
    PersistentVolume(PersistentVolume),
    PersistentVolumeClaim(PersistentVolumeClaim),
    Deployment(Deployment),
    Service(Service),
}

impl ClusterObject {
    pub fn object_ref(&self) -> ObjectRef {
        let (kind, meta) = match self {
            ClusterObject::PersistentVolume(o) => (ObjectKind::PersistentVolume, &o.metadata),
            ClusterObject::PersistentVolumeClaim(o) => {
                (ObjectKind::PersistentVolumeClaim, &o.metadata)
            }
            ClusterObject::Deployment(o) => (ObjectKind::Deployment, &o.metadata),
            ClusterObject::Service(o) => (ObjectKind::Service, &o.metadata),
        };
        ObjectRef {
            kind,
            name: meta.name.clone().unwrap_or_default(),
            namespace: meta.namespace.clone(),
        }
    }
}

/// Standard labels for an object belonging to `component`.
pub fn labels(component: &str) -> BTreeMap<String, String> {
    [
        ("app.kubernetes.io/name".to_string(), component.to_string()),
        ("app.kubernetes.io/part-of".to_string(), "runner-fleet".to_string()),
        ("app.kubernetes.io/managed-by".to_string(), FIELD_MANAGER.to_string()),
    ]
    .into()
}
