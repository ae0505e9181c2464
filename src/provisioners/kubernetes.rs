/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/provisioners/kubernetes.rs
 * Implements `ClusterObjects` against the Kubernetes API of the fleet's k3d
 * cluster. The client is built on first use from the default kubeconfig,
 * pinned to the cluster's context, so nothing connects before the cluster
 * exists and its credentials have been merged.
 * SPDX-License-Identifier: Apache-2.0 */

use super::common::wait_until;
use crate::collaborators::{ClusterObjects, ObjectKind, ObjectRef, SecretSpec};
use crate::error::{Error, Result};
use crate::manifests::{labels, ClusterObject, FIELD_MANAGER};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    Namespace, Node, PersistentVolume, PersistentVolumeClaim, Secret, Service,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config, Resource,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

async fn exists<K>(api: &Api<K>, name: &str) -> Result<bool>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    Ok(api.get_opt(name).await?.is_some())
}

async fn delete_named<K>(api: &Api<K>, kind: &str, name: &str) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Err(Error::not_found(kind, name)),
        Err(e) => Err(e.into()),
    }
}

async fn apply_typed<K>(api: &Api<K>, name: &str, object: &K) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    let params = PatchParams::apply(FIELD_MANAGER).force();
    api.patch(name, &params, &Patch::Apply(object)).await?;
    Ok(())
}

fn node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// A deployment is rolled out once the controller has seen its latest spec
/// and every desired replica is updated and available.
fn rolled_out(deployment: &Deployment) -> bool {
    let Some(status) = &deployment.status else {
        return false;
    };
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let generation = deployment.metadata.generation.unwrap_or(0);
    status.observed_generation.unwrap_or(0) >= generation
        && status.updated_replicas.unwrap_or(0) >= desired
        && status.available_replicas.unwrap_or(0) >= desired
}

/// Cluster objects backed by the Kubernetes API.
pub struct KubeApiObjects {
    context: String,
    client: OnceCell<Client>,
}

impl KubeApiObjects {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            client: OnceCell::new(),
        }
    }

    /// Creates (once) a client for the configured kubeconfig context.
    async fn client(&self) -> Result<Client> {
        let client = self
            .client
            .get_or_try_init(|| async {
                debug!("Connecting to Kubernetes context {}", self.context);
                let kubeconfig =
                    Kubeconfig::read().map_err(|e| Error::Kubeconfig(e.to_string()))?;
                let options = KubeConfigOptions {
                    context: Some(self.context.clone()),
                    ..Default::default()
                };
                let config = Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|e| {
                        Error::Kubeconfig(format!("context {}: {}", self.context, e))
                    })?;
                Ok::<_, Error>(Client::try_from(config)?)
            })
            .await?;
        Ok(client.clone())
    }

    async fn namespaced<K>(&self, namespace: &str) -> Result<Api<K>>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Ok(Api::namespaced(self.client().await?, namespace))
    }

    async fn cluster_scoped<K>(&self) -> Result<Api<K>>
    where
        K: Resource<Scope = k8s_openapi::ClusterResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Ok(Api::all(self.client().await?))
    }
}

/// Namespace of a namespaced object reference.
fn namespace_of(object: &ObjectRef) -> Result<&str> {
    object
        .namespace
        .as_deref()
        .ok_or_else(|| Error::config(format!("{} has no namespace", object)))
}

#[async_trait]
impl ClusterObjects for KubeApiObjects {
    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        let api: Api<Namespace> = self.cluster_scoped().await?;
        exists(&api, name).await
    }

    async fn create_namespace(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = self.cluster_scoped().await?;
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels(name)),
                ..Default::default()
            },
            ..Default::default()
        };
        match api.create(&PostParams::default(), &namespace).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                debug!("Namespace {} already exists", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_namespace(&self, name: &str, timeout: Duration) -> Result<()> {
        let api: Api<Namespace> = self.cluster_scoped().await?;
        delete_named(&api, "namespace", name).await?;
        info!("Waiting for namespace {} to terminate", name);
        let what = format!("namespace {} to be deleted", name);
        wait_until(&what, timeout, || {
            let api = api.clone();
            async move { Ok::<_, Error>(!exists(&api, name).await?) }
        })
        .await
    }

    async fn secret_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        let api: Api<Secret> = self.namespaced(namespace).await?;
        exists(&api, name).await
    }

    async fn create_secret(&self, secret: &SecretSpec) -> Result<()> {
        let api: Api<Secret> = self.namespaced(&secret.namespace).await?;
        let object = Secret {
            metadata: ObjectMeta {
                name: Some(secret.name.clone()),
                namespace: Some(secret.namespace.clone()),
                labels: Some(labels(&secret.name)),
                ..Default::default()
            },
            string_data: Some(secret.data.clone()),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        };
        api.create(&PostParams::default(), &object).await?;
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<Secret> = self.namespaced(namespace).await?;
        delete_named(&api, "secret", name).await
    }

    async fn object_exists(&self, object: &ObjectRef) -> Result<bool> {
        let name = object.name.as_str();
        match object.kind {
            ObjectKind::PersistentVolume => {
                exists(&self.cluster_scoped::<PersistentVolume>().await?, name).await
            }
            ObjectKind::PersistentVolumeClaim => {
                let api: Api<PersistentVolumeClaim> =
                    self.namespaced(namespace_of(object)?).await?;
                exists(&api, name).await
            }
            ObjectKind::Deployment => {
                let api: Api<Deployment> = self.namespaced(namespace_of(object)?).await?;
                exists(&api, name).await
            }
            ObjectKind::Service => {
                let api: Api<Service> = self.namespaced(namespace_of(object)?).await?;
                exists(&api, name).await
            }
        }
    }

    async fn apply(&self, object: &ClusterObject) -> Result<()> {
        let target = object.object_ref();
        debug!("Applying {}", target);
        let name = target.name.as_str();
        match object {
            ClusterObject::PersistentVolume(o) => {
                apply_typed(&self.cluster_scoped().await?, name, o).await
            }
            ClusterObject::PersistentVolumeClaim(o) => {
                apply_typed(&self.namespaced(namespace_of(&target)?).await?, name, o).await
            }
            ClusterObject::Deployment(o) => {
                apply_typed(&self.namespaced(namespace_of(&target)?).await?, name, o).await
            }
            ClusterObject::Service(o) => {
                apply_typed(&self.namespaced(namespace_of(&target)?).await?, name, o).await
            }
        }
    }

    async fn delete(&self, object: &ObjectRef) -> Result<()> {
        let name = object.name.as_str();
        let kind = format!("{:?}", object.kind);
        match object.kind {
            ObjectKind::PersistentVolume => {
                let api: Api<PersistentVolume> = self.cluster_scoped().await?;
                delete_named(&api, &kind, name).await
            }
            ObjectKind::PersistentVolumeClaim => {
                let api: Api<PersistentVolumeClaim> =
                    self.namespaced(namespace_of(object)?).await?;
                delete_named(&api, &kind, name).await
            }
            ObjectKind::Deployment => {
                let api: Api<Deployment> = self.namespaced(namespace_of(object)?).await?;
                delete_named(&api, &kind, name).await
            }
            ObjectKind::Service => {
                let api: Api<Service> = self.namespaced(namespace_of(object)?).await?;
                delete_named(&api, &kind, name).await
            }
        }
    }

    async fn wait_for_nodes_ready(&self, timeout: Duration) -> Result<()> {
        let api: Api<Node> = self.cluster_scoped().await?;
        wait_until("cluster nodes to become Ready", timeout, || {
            let api = api.clone();
            async move {
                match api.list(&ListParams::default()).await {
                    Ok(nodes) => Ok::<_, Error>(
                        !nodes.items.is_empty() && nodes.items.iter().all(node_ready),
                    ),
                    Err(e) => {
                        // The API server may still be starting.
                        debug!("Listing nodes failed: {}", e);
                        Ok(false)
                    }
                }
            }
        })
        .await
    }

    async fn wait_for_rollout(
        &self,
        namespace: &str,
        deployment: &str,
        timeout: Duration,
    ) -> Result<()> {
        let api: Api<Deployment> = self.namespaced(namespace).await?;
        let what = format!("deployment {}/{} to roll out", namespace, deployment);
        wait_until(&what, timeout, || {
            let api = api.clone();
            async move {
                let current = api.get_opt(deployment).await?;
                Ok::<_, Error>(current.as_ref().is_some_and(rolled_out))
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};
    use k8s_openapi::api::core::v1::{NodeCondition, NodeStatus};

    fn node(ready: &str) -> Node {
        Node {
            status: Some(NodeStatus {
                conditions: Some(vec![NodeCondition {
                    type_: "Ready".into(),
                    status: ready.into(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn deployment(generation: i64, observed: i64, available: i32) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                generation: Some(generation),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                observed_generation: Some(observed),
                updated_replicas: Some(available),
                available_replicas: Some(available),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_node_readiness() {
        assert!(node_ready(&node("True")));
        assert!(!node_ready(&node("False")));
        assert!(!node_ready(&Node::default()));
    }

    #[test]
    fn test_rollout_completion() {
        assert!(rolled_out(&deployment(2, 2, 1)));
        assert!(!rolled_out(&deployment(3, 2, 1)));
        assert!(!rolled_out(&deployment(1, 1, 0)));
        assert!(!rolled_out(&Deployment::default()));
    }

    #[test]
    fn test_namespaced_refs_require_namespace() {
        let pv = ObjectRef {
            kind: ObjectKind::PersistentVolume,
            name: "squid-proxy-pv".into(),
            namespace: None,
        };
        assert!(namespace_of(&pv).is_err());
    }
}
