/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/resources.rs
 * `Reconcile` adapters binding each kind of managed resource to the
 * collaborator that owns it. Setup feeds them to `ensure`, teardown to
 * `ensure_absent`.
 * SPDX-License-Identifier: Apache-2.0 */

use crate::collaborators::{
    ChartLifecycle, ClusterLifecycle, ClusterObjects, ClusterSpec, ContainerEngine, HostSystem,
    ObjectRef, RegistrySpec, ReleaseSpec, SecretSpec, Tool,
};
use crate::error::{Error, Result};
use crate::manifests::ClusterObject;
use crate::reconcile::{Presence, Reconcile, ResourceKind, UpdatePolicy};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// A CLI tool on `PATH`. Installed when missing, never removed.
pub struct ToolResource<'a> {
    pub host: &'a dyn HostSystem,
    pub tool: Tool,
}

#[async_trait]
impl Reconcile for ToolResource<'_> {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Tool
    }
    fn identity(&self) -> String {
        self.tool.to_string()
    }
    fn update_policy(&self) -> UpdatePolicy {
        UpdatePolicy::Keep
    }
    async fn observe(&self) -> Result<Presence> {
        Ok(self.host.tool_available(self.tool).into())
    }
    async fn create(&self) -> Result<()> {
        self.host.install_tool(self.tool).await?;
        if self.host.tool_available(self.tool) {
            Ok(())
        } else {
            Err(Error::MissingTool {
                tool: self.tool.to_string(),
                reason: "still not on PATH after installation".to_string(),
            })
        }
    }
    async fn remove(&self) -> Result<()> {
        debug!("Leaving {} installed", self.tool);
        Ok(())
    }
}

/// The unprivileged account runners are provisioned for.
pub struct ServiceAccountResource<'a> {
    pub host: &'a dyn HostSystem,
    pub name: String,
    pub home: PathBuf,
}

#[async_trait]
impl Reconcile for ServiceAccountResource<'_> {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ServiceAccount
    }
    fn identity(&self) -> String {
        self.name.clone()
    }
    fn update_policy(&self) -> UpdatePolicy {
        UpdatePolicy::Keep
    }
    async fn observe(&self) -> Result<Presence> {
        Ok(self.host.user_exists(&self.name).await?.into())
    }
    async fn create(&self) -> Result<()> {
        self.host.create_user(&self.name, &self.home).await
    }
    async fn remove(&self) -> Result<()> {
        self.host.delete_user(&self.name).await
    }
}

/// A host directory owned by the service account.
pub struct DirectoryResource<'a> {
    pub host: &'a dyn HostSystem,
    pub path: PathBuf,
    pub owner: String,
}

#[async_trait]
impl Reconcile for DirectoryResource<'_> {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Directory
    }
    fn identity(&self) -> String {
        self.path.display().to_string()
    }
    fn update_policy(&self) -> UpdatePolicy {
        UpdatePolicy::Keep
    }
    async fn observe(&self) -> Result<Presence> {
        Ok(self.host.path_exists(&self.path).await?.into())
    }
    async fn create(&self) -> Result<()> {
        self.host.ensure_directory(&self.path, &self.owner).await
    }
    async fn remove(&self) -> Result<()> {
        self.host.remove_directory(&self.path).await
    }
}

pub struct RegistryResource<'a> {
    pub clusters: &'a dyn ClusterLifecycle,
    pub spec: RegistrySpec,
}

#[async_trait]
impl Reconcile for RegistryResource<'_> {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Registry
    }
    fn identity(&self) -> String {
        self.spec.name.clone()
    }
    fn update_policy(&self) -> UpdatePolicy {
        UpdatePolicy::Keep
    }
    async fn observe(&self) -> Result<Presence> {
        Ok(self.clusters.registry_exists(&self.spec.name).await?.into())
    }
    async fn create(&self) -> Result<()> {
        self.clusters.create_registry(&self.spec).await
    }
    async fn remove(&self) -> Result<()> {
        self.clusters.delete_registry(&self.spec.name).await
    }
}

/// A locally built runner image. Rebuilt and pushed on every run so
/// changes to the build context reach the registry.
pub struct ImageResource<'a> {
    pub engine: &'a dyn ContainerEngine,
    pub tag: String,
    pub context: Option<PathBuf>,
}

impl ImageResource<'_> {
    async fn build_and_push(&self) -> Result<()> {
        let context = self
            .context
            .as_deref()
            .ok_or_else(|| Error::config(format!("no build context for image {}", self.tag)))?;
        self.engine.build_image(context, &self.tag).await?;
        self.engine.push_image(&self.tag).await
    }
}

#[async_trait]
impl Reconcile for ImageResource<'_> {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Image
    }
    fn identity(&self) -> String {
        self.tag.clone()
    }
    fn update_policy(&self) -> UpdatePolicy {
        UpdatePolicy::Upgrade
    }
    async fn observe(&self) -> Result<Presence> {
        Ok(self.engine.image_exists(&self.tag).await?.into())
    }
    async fn create(&self) -> Result<()> {
        self.build_and_push().await
    }
    async fn update(&self) -> Result<()> {
        self.build_and_push().await
    }
    async fn remove(&self) -> Result<()> {
        self.engine.remove_image(&self.tag).await
    }
}

pub struct ClusterResource<'a> {
    pub clusters: &'a dyn ClusterLifecycle,
    pub spec: ClusterSpec,
}

#[async_trait]
impl Reconcile for ClusterResource<'_> {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Cluster
    }
    fn identity(&self) -> String {
        self.spec.name.clone()
    }
    fn update_policy(&self) -> UpdatePolicy {
        UpdatePolicy::Keep
    }
    async fn observe(&self) -> Result<Presence> {
        Ok(self.clusters.cluster_exists(&self.spec.name).await?.into())
    }
    async fn create(&self) -> Result<()> {
        self.clusters.create_cluster(&self.spec).await
    }
    async fn remove(&self) -> Result<()> {
        self.clusters.delete_cluster(&self.spec.name).await
    }
}

pub struct NamespaceResource<'a> {
    pub objects: &'a dyn ClusterObjects,
    pub name: String,
    /// Bound on waiting for a deleted namespace to disappear.
    pub deletion_timeout: Duration,
}

#[async_trait]
impl Reconcile for NamespaceResource<'_> {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Namespace
    }
    fn identity(&self) -> String {
        self.name.clone()
    }
    fn update_policy(&self) -> UpdatePolicy {
        UpdatePolicy::Keep
    }
    async fn observe(&self) -> Result<Presence> {
        Ok(self.objects.namespace_exists(&self.name).await?.into())
    }
    async fn create(&self) -> Result<()> {
        self.objects.create_namespace(&self.name).await
    }
    async fn remove(&self) -> Result<()> {
        self.objects
            .delete_namespace(&self.name, self.deletion_timeout)
            .await
    }
}

pub struct ReleaseResource<'a> {
    pub charts: &'a dyn ChartLifecycle,
    pub spec: ReleaseSpec,
}

#[async_trait]
impl Reconcile for ReleaseResource<'_> {
    fn kind(&self) -> ResourceKind {
        ResourceKind::HelmRelease
    }
    fn identity(&self) -> String {
        format!("{}/{}", self.spec.namespace, self.spec.name)
    }
    fn update_policy(&self) -> UpdatePolicy {
        UpdatePolicy::Upgrade
    }
    async fn observe(&self) -> Result<Presence> {
        Ok(self
            .charts
            .release_exists(&self.spec.namespace, &self.spec.name)
            .await?
            .into())
    }
    async fn create(&self) -> Result<()> {
        self.charts.install(&self.spec).await
    }
    async fn update(&self) -> Result<()> {
        self.charts.upgrade(&self.spec).await
    }
    async fn remove(&self) -> Result<()> {
        self.charts
            .uninstall(&self.spec.namespace, &self.spec.name)
            .await
    }
}

/// The credential secret. Always recreated so rotated credentials land.
pub struct SecretResource<'a> {
    pub objects: &'a dyn ClusterObjects,
    pub spec: SecretSpec,
}

#[async_trait]
impl Reconcile for SecretResource<'_> {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Secret
    }
    fn identity(&self) -> String {
        format!("{}/{}", self.spec.namespace, self.spec.name)
    }
    fn update_policy(&self) -> UpdatePolicy {
        UpdatePolicy::Replace
    }
    async fn observe(&self) -> Result<Presence> {
        Ok(self
            .objects
            .secret_exists(&self.spec.namespace, &self.spec.name)
            .await?
            .into())
    }
    async fn create(&self) -> Result<()> {
        self.objects.create_secret(&self.spec).await
    }
    async fn remove(&self) -> Result<()> {
        self.objects
            .delete_secret(&self.spec.namespace, &self.spec.name)
            .await
    }
}

/// A typed cluster object kept in sync with server-side apply.
pub struct ObjectResource<'a> {
    objects: &'a dyn ClusterObjects,
    target: ObjectRef,
    desired: Option<ClusterObject>,
}

impl<'a> ObjectResource<'a> {
    /// An object to converge to `desired`.
    pub fn desired(objects: &'a dyn ClusterObjects, desired: ClusterObject) -> Self {
        Self {
            objects,
            target: desired.object_ref(),
            desired: Some(desired),
        }
    }

    /// An object known only by reference, for removal.
    pub fn existing(objects: &'a dyn ClusterObjects, target: ObjectRef) -> Self {
        Self {
            objects,
            target,
            desired: None,
        }
    }

    async fn apply(&self) -> Result<()> {
        match &self.desired {
            Some(object) => self.objects.apply(object).await,
            None => Err(Error::config(format!("no manifest for {}", self.target))),
        }
    }
}

#[async_trait]
impl Reconcile for ObjectResource<'_> {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ClusterObject
    }
    fn identity(&self) -> String {
        self.target.to_string()
    }
    fn update_policy(&self) -> UpdatePolicy {
        UpdatePolicy::Upgrade
    }
    async fn observe(&self) -> Result<Presence> {
        Ok(self.objects.object_exists(&self.target).await?.into())
    }
    async fn create(&self) -> Result<()> {
        self.apply().await
    }
    async fn update(&self) -> Result<()> {
        self.apply().await
    }
    async fn remove(&self) -> Result<()> {
        self.objects.delete(&self.target).await
    }
}
