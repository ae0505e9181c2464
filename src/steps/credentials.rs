/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/steps/credentials.rs
 * Recreates the credential secret in the runner namespace from the
 * validated GitHub credentials.
 * SPDX-License-Identifier: Apache-2.0 */

use super::NAMESPACE_DELETE_TIMEOUT;
use crate::collaborators::{Backends, SecretSpec};
use crate::config::{GithubAuth, Settings, CREDENTIAL_SECRET_NAME};
use crate::error::{Error, Result};
use crate::reconcile::ensure;
use crate::resources::{NamespaceResource, SecretResource};
use std::collections::BTreeMap;

/// The secret fields the scale-set chart reads for `auth`.
pub async fn secret_data(auth: &GithubAuth) -> Result<BTreeMap<String, String>> {
    let data = match auth {
        GithubAuth::App {
            app_id,
            installation_id,
            private_key_path,
        } => {
            let key = tokio::fs::read_to_string(private_key_path)
                .await
                .map_err(|e| {
                    Error::config(format!(
                        "failed to read GitHub App private key {}: {}",
                        private_key_path.display(),
                        e
                    ))
                })?;
            BTreeMap::from([
                ("github_app_id".to_string(), app_id.clone()),
                ("github_app_installation_id".to_string(), installation_id.clone()),
                ("github_app_private_key".to_string(), key),
            ])
        }
        GithubAuth::Token { token } => {
            BTreeMap::from([("github_token".to_string(), token.clone())])
        }
    };
    Ok(data)
}

pub async fn run(settings: &Settings, auth: &GithubAuth, backends: Backends<'_>) -> Result<()> {
    ensure(&NamespaceResource {
        objects: backends.objects,
        name: settings.runner_namespace.clone(),
        deletion_timeout: NAMESPACE_DELETE_TIMEOUT,
    })
    .await?;
    ensure(&SecretResource {
        objects: backends.objects,
        spec: SecretSpec {
            name: CREDENTIAL_SECRET_NAME.to_string(),
            namespace: settings.runner_namespace.clone(),
            data: secret_data(auth).await?,
        },
    })
    .await?;
    Ok(())
}
