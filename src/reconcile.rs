/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/reconcile.rs
 * The check-then-act contract every provisioning step follows. A resource
 * knows how to observe itself and how to create, update and remove itself;
 * `ensure` and `ensure_absent` decide which of those to call from the live
 * state, so reruns converge instead of conflicting.
 * SPDX-License-Identifier: Apache-2.0 */

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use tracing::{debug, info};

/// What kind of thing a reconciled resource is. Used for log lines only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Tool,
    ServiceAccount,
    Directory,
    Registry,
    Image,
    Cluster,
    Namespace,
    HelmRelease,
    Secret,
    ClusterObject,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Tool => "tool",
            ResourceKind::ServiceAccount => "service account",
            ResourceKind::Directory => "directory",
            ResourceKind::Registry => "registry",
            ResourceKind::Image => "image",
            ResourceKind::Cluster => "cluster",
            ResourceKind::Namespace => "namespace",
            ResourceKind::HelmRelease => "helm release",
            ResourceKind::Secret => "secret",
            ResourceKind::ClusterObject => "object",
        };
        f.write_str(name)
    }
}

/// How an already-present resource is brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePolicy {
    /// Presence is enough; nothing is changed.
    Keep,
    /// Updated in place (helm upgrade, server-side apply).
    Upgrade,
    /// Deleted and recreated from the current desired state.
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
}

impl From<bool> for Presence {
    fn from(exists: bool) -> Self {
        if exists {
            Presence::Present
        } else {
            Presence::Absent
        }
    }
}

/// What `ensure`/`ensure_absent` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    Replaced,
    Unchanged,
    Removed,
    AlreadyAbsent,
}

#[async_trait]
pub trait Reconcile: Send + Sync {
    fn kind(&self) -> ResourceKind;
    fn identity(&self) -> String;
    fn update_policy(&self) -> UpdatePolicy;

    async fn observe(&self) -> Result<Presence>;
    async fn create(&self) -> Result<()>;

    /// Only called for `UpdatePolicy::Upgrade`.
    async fn update(&self) -> Result<()> {
        Ok(())
    }

    async fn remove(&self) -> Result<()>;
}

/// Converges `resource` to its desired state.
pub async fn ensure(resource: &dyn Reconcile) -> Result<Outcome> {
    let kind = resource.kind();
    let id = resource.identity();

    let outcome = match (resource.observe().await?, resource.update_policy()) {
        (Presence::Absent, _) => {
            info!("Creating {} '{}'", kind, id);
            resource.create().await?;
            Outcome::Created
        }
        (Presence::Present, UpdatePolicy::Keep) => {
            info!("{} '{}' already exists", capitalize(kind), id);
            Outcome::Unchanged
        }
        (Presence::Present, UpdatePolicy::Upgrade) => {
            info!("Updating {} '{}'", kind, id);
            resource.update().await?;
            Outcome::Updated
        }
        (Presence::Present, UpdatePolicy::Replace) => {
            info!("Replacing {} '{}'", kind, id);
            match resource.remove().await {
                Err(e) if !e.is_not_found() => return Err(e),
                _ => {}
            }
            resource.create().await?;
            Outcome::Replaced
        }
    };
    debug!(?outcome, "{} '{}' reconciled", kind, id);
    Ok(outcome)
}

/// Converges `resource` to "absent". A resource that disappears between the
/// check and the removal counts as already absent.
pub async fn ensure_absent(resource: &dyn Reconcile) -> Result<Outcome> {
    let kind = resource.kind();
    let id = resource.identity();

    if resource.observe().await? == Presence::Absent {
        info!("{} '{}' already absent", capitalize(kind), id);
        return Ok(Outcome::AlreadyAbsent);
    }

    info!("Removing {} '{}'", kind, id);
    match resource.remove().await {
        Ok(()) => Ok(Outcome::Removed),
        Err(e) if e.is_not_found() => {
            info!("{} '{}' was already removed", capitalize(kind), id);
            Ok(Outcome::AlreadyAbsent)
        }
        Err(e) => Err(e),
    }
}

fn capitalize(kind: ResourceKind) -> String {
    let name = kind.to_string();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;

    /// A resource whose live state and call history live in memory.
    struct Tracked {
        policy: UpdatePolicy,
        present: Mutex<bool>,
        calls: Mutex<Vec<&'static str>>,
        vanish_on_remove: bool,
        unreachable_on_remove: bool,
    }

    impl Tracked {
        fn new(policy: UpdatePolicy, present: bool) -> Self {
            Tracked {
                policy,
                present: Mutex::new(present),
                calls: Mutex::new(Vec::new()),
                vanish_on_remove: false,
                unreachable_on_remove: false,
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Reconcile for Tracked {
        fn kind(&self) -> ResourceKind {
            ResourceKind::Namespace
        }
        fn identity(&self) -> String {
            "tracked".into()
        }
        fn update_policy(&self) -> UpdatePolicy {
            self.policy
        }
        async fn observe(&self) -> Result<Presence> {
            Ok((*self.present.lock().unwrap()).into())
        }
        async fn create(&self) -> Result<()> {
            self.calls.lock().unwrap().push("create");
            *self.present.lock().unwrap() = true;
            Ok(())
        }
        async fn update(&self) -> Result<()> {
            self.calls.lock().unwrap().push("update");
            Ok(())
        }
        async fn remove(&self) -> Result<()> {
            self.calls.lock().unwrap().push("remove");
            if self.unreachable_on_remove {
                return Err(Error::CommandFailed {
                    command: "helm uninstall tracked".into(),
                    status: "exit status: 1".into(),
                    stderr: "Error: Kubernetes cluster unreachable: lookup k3d-arc-cluster: no such host"
                        .into(),
                });
            }
            *self.present.lock().unwrap() = false;
            if self.vanish_on_remove {
                return Err(Error::not_found("namespace", "tracked"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_ensure_creates_when_absent() {
        let tracked = Tracked::new(UpdatePolicy::Upgrade, false);
        assert_eq!(ensure(&tracked).await.unwrap(), Outcome::Created);
        assert_eq!(tracked.calls(), vec!["create"]);
    }

    #[tokio::test]
    async fn test_ensure_dispatches_on_policy() {
        let keep = Tracked::new(UpdatePolicy::Keep, true);
        assert_eq!(ensure(&keep).await.unwrap(), Outcome::Unchanged);
        assert!(keep.calls().is_empty());

        let upgrade = Tracked::new(UpdatePolicy::Upgrade, true);
        assert_eq!(ensure(&upgrade).await.unwrap(), Outcome::Updated);
        assert_eq!(upgrade.calls(), vec!["update"]);

        let replace = Tracked::new(UpdatePolicy::Replace, true);
        assert_eq!(ensure(&replace).await.unwrap(), Outcome::Replaced);
        assert_eq!(replace.calls(), vec!["remove", "create"]);
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let tracked = Tracked::new(UpdatePolicy::Keep, false);
        assert_eq!(ensure(&tracked).await.unwrap(), Outcome::Created);
        assert_eq!(ensure(&tracked).await.unwrap(), Outcome::Unchanged);
        assert_eq!(tracked.calls(), vec!["create"]);
    }

    #[tokio::test]
    async fn test_ensure_absent_tolerates_absence() {
        let tracked = Tracked::new(UpdatePolicy::Keep, true);
        assert_eq!(ensure_absent(&tracked).await.unwrap(), Outcome::Removed);
        assert_eq!(ensure_absent(&tracked).await.unwrap(), Outcome::AlreadyAbsent);
        assert_eq!(tracked.calls(), vec!["remove"]);
    }

    #[tokio::test]
    async fn test_ensure_absent_treats_racing_not_found_as_absent() {
        let mut tracked = Tracked::new(UpdatePolicy::Keep, true);
        tracked.vanish_on_remove = true;
        assert_eq!(ensure_absent(&tracked).await.unwrap(), Outcome::AlreadyAbsent);
    }

    #[tokio::test]
    async fn test_ensure_absent_propagates_other_failures() {
        let mut tracked = Tracked::new(UpdatePolicy::Keep, true);
        tracked.unreachable_on_remove = true;
        let err = ensure_absent(&tracked).await.unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
        assert_eq!(tracked.observe().await.unwrap(), Presence::Present);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ResourceKind::HelmRelease.to_string(), "helm release");
        assert_eq!(capitalize(ResourceKind::Cluster), "Cluster");
    }
}
