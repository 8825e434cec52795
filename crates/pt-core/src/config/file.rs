//! The `podtunnel` configuration file

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::TransportError;
use crate::types::{LogLevel, PortMapping, SessionKey};

/// What to do with a fault raised after a tunnel started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultPolicy {
    /// Terminate the process
    #[default]
    Terminate,
    /// Log the fault and let the host decide
    Log,
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PtConfig {
    /// Kubeconfig path (defaults to `$KUBECONFIG` or `~/.kube/config`)
    pub kubeconfig: Option<PathBuf>,

    /// Context overriding the kubeconfig's current context
    pub context: Option<String>,

    /// Session log level
    pub log_level: LogLevel,

    /// Fault handling for running tunnels
    pub fault_policy: FaultPolicy,

    /// Tunnels opened by `podtunnel up`
    #[serde(rename = "forward")]
    pub forwards: Vec<ForwardEntry>,
}

impl PtConfig {
    /// Kubeconfig to use, falling back to the environment default
    pub fn kubeconfig_path(&self) -> PathBuf {
        self.kubeconfig
            .clone()
            .unwrap_or_else(super::default_kubeconfig_path)
    }
}

/// One configured tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardEntry {
    pub namespace: String,
    pub target: String,
    pub local_port: u16,
    pub remote_port: u16,
}

impl ForwardEntry {
    pub fn key(&self) -> SessionKey {
        SessionKey::new(&self.namespace, &self.target)
    }

    pub fn ports(&self) -> Result<PortMapping, TransportError> {
        PortMapping::new(self.local_port, self.remote_port)
    }
}
