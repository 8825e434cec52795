//! Kubeconfig loading
//!
//! Reads the subset of the kubeconfig format needed to reach one API
//! server: the selected context, its cluster and its user. Certificate
//! and key material can be inline (`*-data`, base64) or a file path;
//! relative paths resolve against the kubeconfig's directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

use pt_core::config::default_kubeconfig_path;
use pt_core::traits::CredentialLoader;
use pt_core::{ClusterCredentials, ConfigError};

/// [`CredentialLoader`] backed by kubeconfig files
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeconfigLoader;

impl CredentialLoader for KubeconfigLoader {
    fn load(&self, path: &Path, context: Option<&str>) -> Result<ClusterCredentials, ConfigError> {
        let path = if path.as_os_str().is_empty() {
            default_kubeconfig_path()
        } else {
            path.to_path_buf()
        };
        tracing::debug!("Loading kubeconfig from {}", path.display());

        let kubeconfig = Kubeconfig::read(&path)?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        kubeconfig.credentials(context, &base)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Kubeconfig {
    #[serde(default)]
    clusters: Vec<Named<Cluster>>,
    #[serde(default)]
    contexts: Vec<Named<Context>>,
    #[serde(default)]
    users: Vec<Named<User>>,
    current_context: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Named<T> {
    name: String,
    #[serde(alias = "cluster", alias = "context", alias = "user")]
    item: T,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Cluster {
    server: String,
    certificate_authority: Option<PathBuf>,
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Context {
    cluster: String,
    user: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct User {
    client_certificate: Option<PathBuf>,
    client_certificate_data: Option<String>,
    client_key: Option<PathBuf>,
    client_key_data: Option<String>,
    token: Option<String>,
    #[serde(rename = "tokenFile")]
    token_file: Option<PathBuf>,
    exec: Option<serde_yaml::Value>,
    auth_provider: Option<serde_yaml::Value>,
}

impl Kubeconfig {
    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
            _ => ConfigError::Kubeconfig(format!("{}: {}", path.display(), e)),
        })?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Kubeconfig(e.to_string()))
    }

    fn credentials(
        &self,
        context: Option<&str>,
        base: &Path,
    ) -> Result<ClusterCredentials, ConfigError> {
        let context_name = context
            .or(self.current_context.as_deref())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ConfigError::MissingField("current-context".into()))?;

        let context = find(&self.contexts, context_name, "context")?;
        let cluster = find(&self.clusters, &context.cluster, "cluster")?;
        let user = find(&self.users, &context.user, "user")?;

        if user.exec.is_some() {
            return Err(ConfigError::Kubeconfig(format!(
                "user {} uses an exec credential plugin, which is not supported",
                context.user
            )));
        }
        if user.auth_provider.is_some() {
            return Err(ConfigError::Kubeconfig(format!(
                "user {} uses an auth provider, which is not supported",
                context.user
            )));
        }
        if cluster.server.is_empty() {
            return Err(ConfigError::MissingField(format!(
                "clusters[{}].server",
                context.cluster
            )));
        }

        let token = match (&user.token, &user.token_file) {
            (Some(token), _) => Some(token.clone()),
            (None, Some(file)) => Some(read_text(&resolve(base, file))?.trim().to_string()),
            (None, None) => None,
        };

        Ok(ClusterCredentials {
            server: cluster.server.clone(),
            context: Some(context_name.to_string()),
            ca_pem: material(
                cluster.certificate_authority_data.as_deref(),
                cluster.certificate_authority.as_deref(),
                base,
            )?,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
            client_cert_pem: material(
                user.client_certificate_data.as_deref(),
                user.client_certificate.as_deref(),
                base,
            )?,
            client_key_pem: material(
                user.client_key_data.as_deref(),
                user.client_key.as_deref(),
                base,
            )?,
            token,
        })
    }
}

fn find<'a, T>(entries: &'a [Named<T>], name: &str, what: &str) -> Result<&'a T, ConfigError> {
    entries
        .iter()
        .find(|entry| entry.name == name)
        .map(|entry| &entry.item)
        .ok_or_else(|| ConfigError::Kubeconfig(format!("{} {} not found", what, name)))
}

/// Inline data wins over a file reference
fn material(
    data: Option<&str>,
    file: Option<&Path>,
    base: &Path,
) -> Result<Option<Vec<u8>>, ConfigError> {
    if let Some(data) = data {
        let decoded = STANDARD
            .decode(data.trim())
            .map_err(|e| ConfigError::Kubeconfig(format!("invalid base64 data: {}", e)))?;
        return Ok(Some(decoded));
    }
    match file {
        Some(file) => {
            let path = resolve(base, file);
            fs::read(&path)
                .map(Some)
                .map_err(|e| ConfigError::Kubeconfig(format!("{}: {}", path.display(), e)))
        }
        None => Ok(None),
    }
}

fn read_text(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path)
        .map_err(|e| ConfigError::Kubeconfig(format!("{}: {}", path.display(), e)))
}

fn resolve(base: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        base.join(file)
    }
}
