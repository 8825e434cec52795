//! Collaborators the forwarding core consumes

use async_trait::async_trait;
use std::path::Path;

use crate::credentials::ClusterCredentials;
use crate::error::{ConfigError, ResolveError, TransportError};
use crate::types::{TargetIdentity, TargetKind};

use super::tunnel::TunnelDialer;

/// Outcome of looking up one kind of target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The target exists
    Found,
    /// The API reported that no such target exists
    Missing,
}

/// Loads cluster credentials from a config file
pub trait CredentialLoader: Send + Sync {
    /// Load credentials from `path`, selecting `context` instead of the
    /// file's current context when given
    fn load(&self, path: &Path, context: Option<&str>) -> Result<ClusterCredentials, ConfigError>;
}

/// Checks whether a target of a given kind exists
#[async_trait]
pub trait TargetLookup: Send + Sync {
    /// Look up `name` in `namespace` as a target of `kind`.
    ///
    /// A missing target must be reported as `Ok(Lookup::Missing)`; any
    /// error is treated as a failure of the lookup itself.
    async fn lookup(
        &self,
        credentials: &ClusterCredentials,
        kind: TargetKind,
        namespace: &str,
        name: &str,
    ) -> Result<Lookup, ResolveError>;
}

/// Options applied to a dialer when it is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialOptions {
    /// Report per-connection errors through the transport's error hook
    pub report_errors: bool,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self { report_errors: true }
    }
}

/// Builds dialers bound to one resolved target
pub trait DialerFactory: Send + Sync {
    fn dialer(
        &self,
        credentials: &ClusterCredentials,
        target: &TargetIdentity,
        options: DialOptions,
    ) -> Result<Box<dyn TunnelDialer>, TransportError>;
}
