/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/fakes.rs
 * An in-memory stand-in for every collaborator. Live state sits behind one
 * mutex and every mutating call is appended to a journal, so tests can
 * assert both on the converged state and on what it took to get there.
 * SPDX-License-Identifier: Apache-2.0 */

use crate::collaborators::{
    Backends, ChartLifecycle, ClusterLifecycle, ClusterObjects, ClusterSpec, ContainerEngine,
    HostSystem, ObjectRef, RegistrySpec, ReleaseSpec, SecretSpec, Tool,
};
use crate::error::{Error, Result};
use crate::manifests::ClusterObject;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Everything the fake tracks as live state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorldState {
    pub tools: HashSet<Tool>,
    pub engine_up: bool,
    pub users: BTreeMap<String, PathBuf>,
    pub paths: BTreeSet<PathBuf>,
    pub clusters: BTreeMap<String, ClusterSpec>,
    pub registries: BTreeSet<String>,
    pub images: BTreeSet<String>,
    pub namespaces: BTreeSet<String>,
    /// Keyed by (namespace, name).
    pub secrets: BTreeMap<(String, String), BTreeMap<String, String>>,
    /// Keyed by (namespace, release).
    pub releases: BTreeMap<(String, String), ReleaseSpec>,
    pub objects: BTreeMap<ObjectRef, ClusterObject>,
}

impl WorldState {
    fn clear_namespace(&mut self, namespace: &str) {
        self.secrets.retain(|(ns, _), _| ns != namespace);
        self.releases.retain(|(ns, _), _| ns != namespace);
        self.objects
            .retain(|r, _| r.namespace.as_deref() != Some(namespace));
    }
}

pub struct FakeWorld {
    state: Mutex<WorldState>,
    journal: Mutex<Vec<String>>,
}

impl FakeWorld {
    /// A host with every tool installed and a running engine, and nothing else.
    pub fn new() -> Self {
        Self::with_state(WorldState {
            tools: Tool::ALL.into_iter().collect(),
            engine_up: true,
            ..Default::default()
        })
    }

    pub fn with_state(state: WorldState) -> Self {
        Self {
            state: Mutex::new(state),
            journal: Mutex::new(Vec::new()),
        }
    }

    pub fn backends(&self) -> Backends<'_> {
        Backends {
            clusters: self,
            charts: self,
            objects: self,
            engine: self,
            host: self,
        }
    }

    pub fn snapshot(&self) -> WorldState {
        self.state().clone()
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    pub fn clear_journal(&self) {
        self.journal.lock().unwrap().clear();
    }

    /// Whether any journal entry starts with `prefix`.
    pub fn performed(&self, prefix: &str) -> bool {
        self.journal().iter().any(|e| e.starts_with(prefix))
    }

    fn state(&self) -> MutexGuard<'_, WorldState> {
        self.state.lock().unwrap()
    }

    fn record(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }

    /// Cluster API calls fail without a cluster, as they would with no kubeconfig context.
    fn cluster_api(&self) -> Result<MutexGuard<'_, WorldState>> {
        let state = self.state();
        if state.clusters.is_empty() {
            return Err(Error::Kubeconfig("no cluster is running".into()));
        }
        Ok(state)
    }
}

#[async_trait]
impl ClusterLifecycle for FakeWorld {
    async fn cluster_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state().clusters.contains_key(name))
    }

    async fn create_cluster(&self, spec: &ClusterSpec) -> Result<()> {
        self.record(format!("create_cluster {}", spec.name));
        self.state().clusters.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    async fn delete_cluster(&self, name: &str) -> Result<()> {
        self.record(format!("delete_cluster {}", name));
        let mut state = self.state();
        if state.clusters.remove(name).is_none() {
            return Err(Error::not_found("cluster", name));
        }
        state.namespaces.clear();
        state.secrets.clear();
        state.releases.clear();
        state.objects.clear();
        Ok(())
    }

    async fn merge_kubeconfig(&self, name: &str) -> Result<()> {
        if self.state().clusters.contains_key(name) {
            Ok(())
        } else {
            Err(Error::not_found("cluster", name))
        }
    }

    async fn registry_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state().registries.contains(name))
    }

    async fn create_registry(&self, spec: &RegistrySpec) -> Result<()> {
        self.record(format!("create_registry {}", spec.name));
        self.state().registries.insert(spec.name.clone());
        Ok(())
    }

    async fn delete_registry(&self, name: &str) -> Result<()> {
        self.record(format!("delete_registry {}", name));
        if self.state().registries.remove(name) {
            Ok(())
        } else {
            Err(Error::not_found("registry", name))
        }
    }
}

#[async_trait]
impl ChartLifecycle for FakeWorld {
    async fn release_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        Ok(self
            .state()
            .releases
            .contains_key(&(namespace.to_string(), name.to_string())))
    }

    async fn install(&self, release: &ReleaseSpec) -> Result<()> {
        self.record(format!("install {}/{}", release.namespace, release.name));
        let mut state = self.cluster_api()?;
        if !state.namespaces.contains(&release.namespace) {
            return Err(Error::not_found("namespace", release.namespace.clone()));
        }
        state.releases.insert(
            (release.namespace.clone(), release.name.clone()),
            release.clone(),
        );
        Ok(())
    }

    async fn upgrade(&self, release: &ReleaseSpec) -> Result<()> {
        self.record(format!("upgrade {}/{}", release.namespace, release.name));
        let mut state = self.cluster_api()?;
        let key = (release.namespace.clone(), release.name.clone());
        match state.releases.get_mut(&key) {
            Some(current) => {
                *current = release.clone();
                Ok(())
            }
            None => Err(Error::not_found("helm release", release.name.clone())),
        }
    }

    async fn uninstall(&self, namespace: &str, name: &str) -> Result<()> {
        self.record(format!("uninstall {}/{}", namespace, name));
        let mut state = self.cluster_api()?;
        match state
            .releases
            .remove(&(namespace.to_string(), name.to_string()))
        {
            Some(_) => Ok(()),
            None => Err(Error::not_found("helm release", name)),
        }
    }

    async fn list_releases(&self, namespace: &str) -> Result<Vec<String>> {
        let state = self.cluster_api()?;
        Ok(state
            .releases
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect())
    }
}

#[async_trait]
impl ClusterObjects for FakeWorld {
    async fn namespace_exists(&self, name: &str) -> Result<bool> {
        Ok(self.cluster_api()?.namespaces.contains(name))
    }

    async fn create_namespace(&self, name: &str) -> Result<()> {
        self.record(format!("create_namespace {}", name));
        self.cluster_api()?.namespaces.insert(name.to_string());
        Ok(())
    }

    async fn delete_namespace(&self, name: &str, _timeout: Duration) -> Result<()> {
        self.record(format!("delete_namespace {}", name));
        let mut state = self.cluster_api()?;
        if !state.namespaces.remove(name) {
            return Err(Error::not_found("namespace", name));
        }
        state.clear_namespace(name);
        Ok(())
    }

    async fn secret_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        Ok(self
            .cluster_api()?
            .secrets
            .contains_key(&(namespace.to_string(), name.to_string())))
    }

    async fn create_secret(&self, secret: &SecretSpec) -> Result<()> {
        self.record(format!("create_secret {}/{}", secret.namespace, secret.name));
        let mut state = self.cluster_api()?;
        if !state.namespaces.contains(&secret.namespace) {
            return Err(Error::not_found("namespace", secret.namespace.clone()));
        }
        let key = (secret.namespace.clone(), secret.name.clone());
        if state.secrets.contains_key(&key) {
            return Err(Error::config(format!("secret {} already exists", secret.name)));
        }
        state.secrets.insert(key, secret.data.clone());
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        self.record(format!("delete_secret {}/{}", namespace, name));
        let mut state = self.cluster_api()?;
        match state
            .secrets
            .remove(&(namespace.to_string(), name.to_string()))
        {
            Some(_) => Ok(()),
            None => Err(Error::not_found("secret", name)),
        }
    }

    async fn object_exists(&self, object: &ObjectRef) -> Result<bool> {
        Ok(self.cluster_api()?.objects.contains_key(object))
    }

    async fn apply(&self, object: &ClusterObject) -> Result<()> {
        let target = object.object_ref();
        self.record(format!("apply {}", target));
        let mut state = self.cluster_api()?;
        if let Some(ns) = &target.namespace {
            if !state.namespaces.contains(ns) {
                return Err(Error::not_found("namespace", ns.clone()));
            }
        }
        state.objects.insert(target, object.clone());
        Ok(())
    }

    async fn delete(&self, object: &ObjectRef) -> Result<()> {
        self.record(format!("delete {}", object));
        match self.cluster_api()?.objects.remove(object) {
            Some(_) => Ok(()),
            None => Err(Error::not_found(format!("{:?}", object.kind), object.name.clone())),
        }
    }

    async fn wait_for_nodes_ready(&self, _timeout: Duration) -> Result<()> {
        self.cluster_api().map(|_| ())
    }

    async fn wait_for_rollout(
        &self,
        namespace: &str,
        deployment: &str,
        timeout: Duration,
    ) -> Result<()> {
        let state = self.cluster_api()?;
        if state.namespaces.contains(namespace) {
            Ok(())
        } else {
            Err(Error::Timeout {
                what: format!("deployment {}/{} to roll out", namespace, deployment),
                after: timeout,
            })
        }
    }
}

#[async_trait]
impl ContainerEngine for FakeWorld {
    async fn ping(&self) -> Result<()> {
        if self.state().engine_up {
            Ok(())
        } else {
            Err(Error::EngineUnreachable("daemon is not running".into()))
        }
    }

    async fn image_exists(&self, reference: &str) -> Result<bool> {
        Ok(self.state().images.contains(reference))
    }

    async fn build_image(&self, context: &Path, tag: &str) -> Result<()> {
        self.record(format!("build_image {} {}", tag, context.display()));
        self.state().images.insert(tag.to_string());
        Ok(())
    }

    async fn push_image(&self, tag: &str) -> Result<()> {
        self.record(format!("push_image {}", tag));
        Ok(())
    }

    async fn remove_image(&self, reference: &str) -> Result<()> {
        self.record(format!("remove_image {}", reference));
        if self.state().images.remove(reference) {
            Ok(())
        } else {
            Err(Error::not_found("image", reference))
        }
    }
}

#[async_trait]
impl HostSystem for FakeWorld {
    fn tool_available(&self, tool: Tool) -> bool {
        self.state().tools.contains(&tool)
    }

    async fn install_tool(&self, tool: Tool) -> Result<()> {
        self.record(format!("install_tool {}", tool));
        self.state().tools.insert(tool);
        Ok(())
    }

    async fn user_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state().users.contains_key(name))
    }

    async fn create_user(&self, name: &str, home: &Path) -> Result<()> {
        self.record(format!("create_user {}", name));
        let mut state = self.state();
        state.users.insert(name.to_string(), home.to_path_buf());
        state.paths.insert(home.to_path_buf());
        Ok(())
    }

    async fn delete_user(&self, name: &str) -> Result<()> {
        self.record(format!("delete_user {}", name));
        let mut state = self.state();
        match state.users.remove(name) {
            Some(home) => {
                state.paths.retain(|p| !p.starts_with(&home));
                Ok(())
            }
            None => Err(Error::not_found("user", name)),
        }
    }

    async fn path_exists(&self, path: &Path) -> Result<bool> {
        Ok(self.state().paths.contains(path))
    }

    async fn ensure_directory(&self, path: &Path, owner: &str) -> Result<()> {
        self.record(format!("ensure_directory {} {}", path.display(), owner));
        let mut state = self.state();
        for ancestor in path.ancestors().filter(|a| !a.as_os_str().is_empty()) {
            state.paths.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    async fn remove_directory(&self, path: &Path) -> Result<()> {
        self.record(format!("remove_directory {}", path.display()));
        let mut state = self.state();
        if !state.paths.contains(path) {
            return Err(Error::not_found("directory", path.display().to_string()));
        }
        state.paths.retain(|p| !p.starts_with(path));
        Ok(())
    }
}

/// Settings parsed from inline `KEY=VALUE` lines.
pub fn settings(lines: &str) -> crate::config::Settings {
    let pairs = crate::config::parse_env_file(lines).unwrap();
    crate::config::Settings::from_pairs(&pairs).unwrap()
}
