/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/config.rs
 * Loads the flat `KEY=VALUE` fleet configuration into a typed `Settings`
 * value and validates the authentication fields before anything touches the
 * host or the cluster.
 * SPDX-License-Identifier: Apache-2.0 */

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Namespace holding the runner-controller release.
pub const CONTROLLER_NAMESPACE: &str = "arc-systems";
/// Namespace holding the cache-proxy workloads.
pub const CACHE_NAMESPACE: &str = "cache-system";
/// Release name of the runner-controller chart.
pub const CONTROLLER_RELEASE: &str = "arc";
/// Secret the scale set reads its GitHub credentials from.
pub const CREDENTIAL_SECRET_NAME: &str = "github-app-secret";
/// Path the host cache directory is mounted at inside every k3d node.
pub const NODE_CACHE_MOUNT: &str = "/var/lib/runner-cache";

const KNOWN_KEYS: &[&str] = &[
    "GITHUB_APP_ID",
    "GITHUB_APP_INSTALLATION_ID",
    "GITHUB_APP_PRIVATE_KEY_PATH",
    "GITHUB_PAT",
    "GITHUB_ORG",
    "GITHUB_REPO",
    "GITHUB_URL",
    "RUNNER_SCALE_SET_NAME",
    "MIN_RUNNERS",
    "MAX_RUNNERS",
    "K3D_CLUSTER_NAME",
    "K3D_AGENTS",
    "RUNNER_NAMESPACE",
    "ENABLE_CACHE_PROXY",
    "RUNNER_USER",
    "RUNNER_HOME",
    "CACHE_DIR",
    "RUNNER_IMAGE",
    "RUNNER_IMAGE_CONTEXT",
    "REGISTRY_NAME",
    "REGISTRY_PORT",
    "ARC_CHART_VERSION",
];

/// Authentication fields exactly as they appear in the file.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RawCredentials {
    pub app_id: Option<String>,
    pub installation_id: Option<String>,
    pub private_key_path: Option<PathBuf>,
    pub token: Option<String>,
}

impl fmt::Debug for RawCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCredentials")
            .field("app_id", &self.app_id)
            .field("installation_id", &self.installation_id)
            .field("private_key_path", &self.private_key_path)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Validated GitHub credentials for the selected authentication mode.
#[derive(Clone, PartialEq, Eq)]
pub enum GithubAuth {
    App {
        app_id: String,
        installation_id: String,
        private_key_path: PathBuf,
    },
    Token {
        token: String,
    },
}

impl fmt::Debug for GithubAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GithubAuth::App {
                app_id,
                installation_id,
                private_key_path,
            } => f
                .debug_struct("App")
                .field("app_id", app_id)
                .field("installation_id", installation_id)
                .field("private_key_path", private_key_path)
                .finish(),
            GithubAuth::Token { .. } => f.debug_struct("Token").field("token", &"<redacted>").finish(),
        }
    }
}

impl GithubAuth {
    pub fn mode(&self) -> &'static str {
        match self {
            GithubAuth::App { .. } => "GitHub App",
            GithubAuth::Token { .. } => "personal access token",
        }
    }
}

/// The runner image reference as seen from the host and from inside the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerImage {
    /// Tag built and pushed from the host. Equal to `cluster_ref` for upstream images.
    pub host_ref: String,
    /// Reference the runner pods pull.
    pub cluster_ref: String,
    /// Docker build context, set only for locally built images.
    pub build_context: Option<PathBuf>,
}

/// The fleet configuration, immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub credentials: RawCredentials,
    pub github_url: String,
    pub github_org: String,
    pub github_repo: Option<String>,
    pub scale_set_name: String,
    pub min_runners: u32,
    pub max_runners: u32,
    pub cluster_name: String,
    pub agents: u32,
    pub runner_namespace: String,
    pub enable_cache_proxy: bool,
    pub runner_user: String,
    pub runner_home: PathBuf,
    pub cache_dir: PathBuf,
    pub runner_image: String,
    pub runner_image_context: Option<PathBuf>,
    pub registry_name: String,
    pub registry_port: u16,
    pub chart_version: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        // An empty map only ever falls back to defaults, which always parse.
        Self::from_pairs(&BTreeMap::new()).unwrap_or_else(|_| unreachable!())
    }
}

impl Settings {
    /// Reads and parses the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let pairs = parse_env_file(&contents)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
        Self::from_pairs(&pairs)
    }

    /// Builds settings from parsed pairs, applying defaults for unset keys.
    pub fn from_pairs(pairs: &BTreeMap<String, String>) -> Result<Self> {
        for key in pairs.keys().filter(|k| !KNOWN_KEYS.contains(&k.as_str())) {
            debug!("Ignoring unknown configuration key {}", key);
        }

        let get = |key: &str| -> Option<String> {
            pairs
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let runner_user = get("RUNNER_USER").unwrap_or_else(|| "arc-runner".to_string());
        let runner_home = get("RUNNER_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/home").join(&runner_user));
        let cache_dir = get("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| runner_home.join("cache"));

        Ok(Settings {
            credentials: RawCredentials {
                app_id: get("GITHUB_APP_ID"),
                installation_id: get("GITHUB_APP_INSTALLATION_ID"),
                private_key_path: get("GITHUB_APP_PRIVATE_KEY_PATH").map(PathBuf::from),
                token: get("GITHUB_PAT"),
            },
            github_url: get("GITHUB_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://github.com".to_string()),
            github_org: get("GITHUB_ORG").unwrap_or_default(),
            github_repo: get("GITHUB_REPO"),
            scale_set_name: get("RUNNER_SCALE_SET_NAME")
                .unwrap_or_else(|| "arc-runner-set".to_string()),
            min_runners: parse_number(get("MIN_RUNNERS"), "MIN_RUNNERS", 0)?,
            max_runners: parse_number(get("MAX_RUNNERS"), "MAX_RUNNERS", 5)?,
            cluster_name: get("K3D_CLUSTER_NAME").unwrap_or_else(|| "arc-cluster".to_string()),
            agents: parse_number(get("K3D_AGENTS"), "K3D_AGENTS", 0)?,
            runner_namespace: get("RUNNER_NAMESPACE").unwrap_or_else(|| "arc-runners".to_string()),
            enable_cache_proxy: parse_flag(get("ENABLE_CACHE_PROXY"), "ENABLE_CACHE_PROXY")?,
            runner_user,
            runner_home,
            cache_dir,
            runner_image: get("RUNNER_IMAGE")
                .unwrap_or_else(|| "ghcr.io/actions/actions-runner:latest".to_string()),
            runner_image_context: get("RUNNER_IMAGE_CONTEXT").map(PathBuf::from),
            registry_name: get("REGISTRY_NAME").unwrap_or_else(|| "arc-registry".to_string()),
            registry_port: parse_number(get("REGISTRY_PORT"), "REGISTRY_PORT", 5000)?,
            chart_version: get("ARC_CHART_VERSION"),
        })
    }

    /// Checks everything `setup` needs before its first mutating call and
    /// returns the credentials of the selected mode.
    pub fn validate(&self) -> Result<GithubAuth> {
        if self.github_org.is_empty() {
            return Err(Error::config("GITHUB_ORG is required"));
        }
        if self.min_runners > self.max_runners {
            return Err(Error::config(format!(
                "MIN_RUNNERS ({}) must not exceed MAX_RUNNERS ({})",
                self.min_runners, self.max_runners
            )));
        }
        if self.scale_set_name.is_empty() || self.scale_set_name.len() > 45 {
            return Err(Error::config(
                "RUNNER_SCALE_SET_NAME must be between 1 and 45 characters",
            ));
        }
        // Both become Kubernetes object names: the helm release and its namespace.
        for (key, value) in [
            ("RUNNER_SCALE_SET_NAME", &self.scale_set_name),
            ("RUNNER_NAMESPACE", &self.runner_namespace),
        ] {
            if !is_dns_label(value) {
                return Err(Error::config(format!(
                    "{} '{}' must be lowercase letters, digits and '-', \
                     starting and ending with a letter or digit",
                    key, value
                )));
            }
        }

        let creds = &self.credentials;
        let app_mode = creds.app_id.is_some()
            || creds.installation_id.is_some()
            || creds.private_key_path.is_some();

        if app_mode {
            let (app_id, installation_id, key_path) = match (
                &creds.app_id,
                &creds.installation_id,
                &creds.private_key_path,
            ) {
                (Some(id), Some(inst), Some(key)) => (id.clone(), inst.clone(), key.clone()),
                (id, inst, key) => {
                    let missing: Vec<&str> = [
                        ("GITHUB_APP_ID", id.is_none()),
                        ("GITHUB_APP_INSTALLATION_ID", inst.is_none()),
                        ("GITHUB_APP_PRIVATE_KEY_PATH", key.is_none()),
                    ]
                    .iter()
                    .filter(|(_, absent)| *absent)
                    .map(|(name, _)| *name)
                    .collect();
                    return Err(Error::config(format!(
                        "GitHub App authentication requires {}",
                        missing.join(", ")
                    )));
                }
            };

            if !key_path.is_file() {
                return Err(Error::config(format!(
                    "GitHub App private key not found: {}",
                    key_path.display()
                )));
            }
            warn_on_loose_permissions(&key_path);

            return Ok(GithubAuth::App {
                app_id,
                installation_id,
                private_key_path: key_path,
            });
        }

        match &creds.token {
            Some(token) => Ok(GithubAuth::Token {
                token: token.clone(),
            }),
            None => Err(Error::config(
                "no GitHub credentials: set GITHUB_APP_ID, GITHUB_APP_INSTALLATION_ID and \
                 GITHUB_APP_PRIVATE_KEY_PATH, or GITHUB_PAT",
            )),
        }
    }

    /// The GitHub URL the scale set registers against.
    pub fn target_url(&self) -> String {
        match &self.github_repo {
            Some(repo) => format!("{}/{}/{}", self.github_url, self.github_org, repo),
            None => format!("{}/{}", self.github_url, self.github_org),
        }
    }

    /// Kubeconfig context k3d writes for this cluster.
    pub fn kube_context(&self) -> String {
        format!("k3d-{}", self.cluster_name)
    }

    pub fn runner_image(&self) -> RunnerImage {
        match &self.runner_image_context {
            Some(context) => {
                let name = self
                    .runner_image
                    .rsplit('/')
                    .next()
                    .unwrap_or(&self.runner_image);
                RunnerImage {
                    host_ref: format!("localhost:{}/{}", self.registry_port, name),
                    cluster_ref: format!(
                        "k3d-{}:{}/{}",
                        self.registry_name, self.registry_port, name
                    ),
                    build_context: Some(context.clone()),
                }
            }
            None => RunnerImage {
                host_ref: self.runner_image.clone(),
                cluster_ref: self.runner_image.clone(),
                build_context: None,
            },
        }
    }

    /// Host cache directories backing the cache-proxy volumes.
    pub fn cache_subdirs(&self) -> Vec<PathBuf> {
        crate::manifests::cache::CACHE_WORKLOADS
            .iter()
            .map(|w| self.cache_dir.join(w.name))
            .collect()
    }
}

#[cfg(unix)]
fn warn_on_loose_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            warn!(
                "Private key {} has permissions {:o}; consider `chmod 600`",
                path.display(),
                mode
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_on_loose_permissions(_path: &Path) {}

fn parse_number<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| Error::config(format!("{} must be a non-negative integer, got '{}'", key, v))),
    }
}

fn parse_flag(value: Option<String>, key: &str) -> Result<bool> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("true" | "yes" | "1" | "on") => Ok(true),
        Some("false" | "no" | "0" | "off") => Ok(false),
        Some(other) => Err(Error::config(format!(
            "{} must be true or false, got '{}'",
            key, other
        ))),
    }
}

/// Parses shell-style `KEY=VALUE` lines.
///
/// Blank lines and `#` comments are skipped, an `export ` prefix is allowed,
/// quoted values are unquoted and a trailing ` # comment` after an unquoted
/// value is dropped. Later assignments win. No variable expansion happens.
pub fn parse_env_file(contents: &str) -> std::result::Result<BTreeMap<String, String>, String> {
    let mut pairs = BTreeMap::new();
    for (idx, line) in contents.lines().enumerate() {
        if let Some((key, value)) =
            parse_env_line(line).map_err(|e| format!("line {}: {}", idx + 1, e))?
        {
            pairs.insert(key, value);
        }
    }
    Ok(pairs)
}

fn parse_env_line(line: &str) -> std::result::Result<Option<(String, String)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

    let (key, rest) = line
        .split_once('=')
        .ok_or_else(|| "expected KEY=VALUE".to_string())?;
    let key = key.trim();
    let valid_key = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_key {
        return Err(format!("invalid key '{}'", key));
    }

    let rest = rest.trim_start();
    let value = match rest.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            let body = &rest[1..];
            let mut value = String::new();
            let mut chars = body.char_indices();
            let mut closed_at = None;
            while let Some((i, c)) = chars.next() {
                if c == quote {
                    closed_at = Some(i);
                    break;
                }
                if c == '\\' && quote == '"' {
                    if let Some((_, escaped)) = chars.next() {
                        value.push(escaped);
                        continue;
                    }
                }
                value.push(c);
            }
            let end = closed_at.ok_or_else(|| format!("unterminated {} quote", quote))?;
            let trailing = body[end + 1..].trim();
            if !trailing.is_empty() && !trailing.starts_with('#') {
                return Err(format!("unexpected text after quoted value: '{}'", trailing));
            }
            value
        }
        _ => {
            let cut = rest
                .char_indices()
                .find(|&(i, c)| c == '#' && rest[..i].ends_with(char::is_whitespace))
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            rest[..cut].trim_end().to_string()
        }
    };

    Ok(Some((key.to_string(), value)))
}

/// An RFC 1123 label, as Kubernetes requires for namespace and release names.
fn is_dns_label(value: &str) -> bool {
    let bytes = value.as_bytes();
    let edge_ok = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            bytes.len() <= 63
                && edge_ok(first)
                && edge_ok(last)
                && bytes.iter().all(|b| edge_ok(b) || *b == b'-')
        }
        _ => false,
    }
}
