//! API server addressing
//!
//! Cluster servers are often reached through a proxy that mounts the API
//! under a path prefix (`https://proxy.example/api/clusters/c1`). Every API
//! path built here keeps that prefix in front of the resource path.

use url::Url;

use crate::error::TransportError;
use crate::types::TargetIdentity;

/// A parsed API server URL split into authority and path prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiServer {
    host: String,
    prefix: String,
}

impl ApiServer {
    /// Parse a server URL. Only `https` servers are accepted.
    pub fn parse(server: &str) -> Result<Self, TransportError> {
        let url = Url::parse(server.trim())
            .map_err(|e| TransportError::InvalidServer(format!("{}: {}", server, e)))?;

        if url.scheme() != "https" {
            return Err(TransportError::InvalidServer(format!(
                "{}: scheme must be https",
                server
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| TransportError::InvalidServer(format!("{}: missing host", server)))?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self {
            host,
            prefix: url.path().trim_end_matches('/').to_string(),
        })
    }

    /// Authority part (`host[:port]`)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Path prefix, empty when the API is mounted at the root
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prefix an absolute API path
    pub fn path(&self, api_path: &str) -> String {
        format!("{}{}", self.prefix, api_path)
    }

    /// Full URL for an API path under the given scheme
    pub fn url(&self, scheme: &str, api_path: &str) -> String {
        format!("{}://{}{}", scheme, self.host, self.path(api_path))
    }
}

/// `/api/v1/namespaces/{ns}/{kind}/{name}`
pub fn resource_path(target: &TargetIdentity) -> String {
    format!(
        "/api/v1/namespaces/{}/{}/{}",
        target.namespace,
        target.kind.resource(),
        target.name
    )
}

/// `/api/v1/namespaces/{ns}/{kind}/{name}/portforward`
pub fn portforward_path(target: &TargetIdentity) -> String {
    format!("{}/portforward", resource_path(target))
}

/// Where a tunnel for one target is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelEndpoint {
    /// Authority of the API server
    pub host: String,
    /// Port-forward path, including any server prefix
    pub path: String,
}

impl TunnelEndpoint {
    pub fn for_target(server: &str, target: &TargetIdentity) -> Result<Self, TransportError> {
        let api = ApiServer::parse(server)?;
        Ok(Self {
            path: api.path(&portforward_path(target)),
            host: api.host,
        })
    }

    /// URL of the endpoint under the given scheme (`https`, `wss`)
    pub fn url(&self, scheme: &str) -> String {
        format!("{}://{}{}", scheme, self.host, self.path)
    }
}
