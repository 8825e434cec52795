//! Target lookup against the cluster API

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use pt_core::endpoint::{resource_path, ApiServer};
use pt_core::traits::{Lookup, TargetLookup};
use pt_core::{ClusterCredentials, ResolveError, TargetIdentity, TargetKind};

use crate::tls::client_config;

/// [`TargetLookup`] issuing `GET` requests for services and pods.
///
/// One HTTP client is kept per set of TLS material, so repeated lookups
/// against the same cluster reuse its connection pool.
#[derive(Debug, Default)]
pub struct ApiLookup {
    clients: Mutex<HashMap<TlsIdentity, reqwest::Client>>,
}

/// The parts of the credentials a client's TLS config is built from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TlsIdentity {
    ca_pem: Option<Vec<u8>>,
    insecure_skip_tls_verify: bool,
    client_cert_pem: Option<Vec<u8>>,
    client_key_pem: Option<Vec<u8>>,
}

impl From<&ClusterCredentials> for TlsIdentity {
    fn from(credentials: &ClusterCredentials) -> Self {
        Self {
            ca_pem: credentials.ca_pem.clone(),
            insecure_skip_tls_verify: credentials.insecure_skip_tls_verify,
            client_cert_pem: credentials.client_cert_pem.clone(),
            client_key_pem: credentials.client_key_pem.clone(),
        }
    }
}

impl ApiLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client for `credentials`, built on first use
    fn client(&self, credentials: &ClusterCredentials) -> Result<reqwest::Client, ResolveError> {
        let identity = TlsIdentity::from(credentials);
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| request_error("client cache poisoned"))?;
        if let Some(client) = clients.get(&identity) {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .use_preconfigured_tls(client_config(credentials).map_err(request_error)?)
            .build()
            .map_err(request_error)?;
        tracing::trace!("Built API client for {}", credentials.server);
        clients.insert(identity, client.clone());
        Ok(client)
    }

    #[cfg(test)]
    fn cached_clients(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or_default()
    }
}

/// Body of a Kubernetes `Status` failure
#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

#[async_trait]
impl TargetLookup for ApiLookup {
    async fn lookup(
        &self,
        credentials: &ClusterCredentials,
        kind: TargetKind,
        namespace: &str,
        name: &str,
    ) -> Result<Lookup, ResolveError> {
        let api = ApiServer::parse(&credentials.server).map_err(request_error)?;
        let target = TargetIdentity::new(namespace, kind, name);
        let url = api.url("https", &resource_path(&target));
        tracing::debug!("GET {}", url);

        let client = self.client(credentials)?;
        let mut request = client.get(&url);
        if let Some(token) = &credentials.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(request_error)?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify(status, &body)
    }
}

fn classify(status: StatusCode, body: &str) -> Result<Lookup, ResolveError> {
    if status.is_success() {
        return Ok(Lookup::Found);
    }
    if status == StatusCode::NOT_FOUND {
        return Ok(Lookup::Missing);
    }

    let message = serde_json::from_str::<ApiStatus>(body)
        .map(|s| s.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
    Err(ResolveError::Api {
        status: status.as_u16(),
        message,
    })
}

fn request_error(e: impl std::fmt::Display) -> ResolveError {
    ResolveError::Request(e.to_string())
}
