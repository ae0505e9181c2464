/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/error.rs
 * Error type shared by every provisioning step. Configuration and
 * environment errors are fatal; `NotFound` is the tolerated-absence signal
 * consumed by the reconciliation layer during teardown.
 * SPDX-License-Identifier: Apache-2.0 */

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("required tool '{tool}' is missing and could not be installed: {reason}")]
    MissingTool { tool: String, reason: String },

    #[error("container engine is not reachable: {0}")]
    EngineUnreachable(String),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("kubeconfig error: {0}")]
    Kubeconfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to render YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// True for errors that mean the target resource is already gone.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube(kube::Error::Api(ae)) => ae.code == 404,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
