//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, TransportError};

/// Identifies one logical tunnel slot: at most one session per key is live
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    /// Namespace the target lives in
    pub namespace: String,
    /// Name of the pod or service as given by the caller
    pub target: String,
}

impl SessionKey {
    /// Create a new session key
    pub fn new(namespace: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.target)
    }
}

/// Kind of workload a tunnel can terminate in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// A stable service endpoint
    Service,
    /// A single pod
    Pod,
}

impl TargetKind {
    /// Lookup order used when a bare name is resolved
    pub const PRECEDENCE: [TargetKind; 2] = [TargetKind::Service, TargetKind::Pod];

    /// Resource segment used in API paths
    pub fn resource(&self) -> &'static str {
        match self {
            TargetKind::Service => "services",
            TargetKind::Pod => "pods",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource())
    }
}

/// A resolved target: namespace, kind and name of the remote endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetIdentity {
    pub namespace: String,
    pub kind: TargetKind,
    pub name: String,
}

impl TargetIdentity {
    pub fn new(namespace: impl Into<String>, kind: TargetKind, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.kind, self.name)
    }
}

/// Local and remote port of a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMapping {
    /// Local port to listen on (0 lets the OS pick one)
    pub local: u16,
    /// Port inside the target
    pub remote: u16,
}

impl PortMapping {
    /// Create a mapping, rejecting a zero remote port
    pub fn new(local: u16, remote: u16) -> Result<Self, TransportError> {
        if remote == 0 {
            return Err(TransportError::InvalidPorts(format!(
                "remote port must be greater than 0 (got {}:{})",
                local, remote
            )));
        }
        Ok(Self { local, remote })
    }
}

impl FromStr for PortMapping {
    type Err = TransportError;

    /// Parse `local:remote`, or a single port used for both sides
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim().parse::<u16>().map_err(|_| {
                TransportError::InvalidPorts(format!("invalid port '{}' in '{}'", part, s))
            })
        };

        match s.split_once(':') {
            Some((local, remote)) => {
                let local = if local.trim().is_empty() { 0 } else { parse(local)? };
                PortMapping::new(local, parse(remote)?)
            }
            None => {
                let port = parse(s)?;
                PortMapping::new(port, port)
            }
        }
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.local, self.remote)
    }
}

/// Verbosity of a forwarding session, ordered from most to least verbose
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug = 0,
    #[default]
    Info = 1,
    Warn = 2,
    Error = 3,
    /// Silences logging and the transport's error-reporting hook
    Off = 4,
}

impl LogLevel {
    /// Whether the level disables all output
    pub fn is_off(&self) -> bool {
        *self == LogLevel::Off
    }

    /// Convert from the integer form (0 = debug .. 4 = off)
    pub fn from_int(level: i32) -> Option<Self> {
        match level {
            0 => Some(LogLevel::Debug),
            1 => Some(LogLevel::Info),
            2 => Some(LogLevel::Warn),
            3 => Some(LogLevel::Error),
            4 => Some(LogLevel::Off),
            _ => None,
        }
    }

    /// Matching `tracing` filter
    pub fn as_level_filter(&self) -> tracing::level_filters::LevelFilter {
        use tracing::level_filters::LevelFilter;
        match self {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        };
        f.write_str(name)
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(n) = s.parse::<i32>() {
            return LogLevel::from_int(n)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown log level: {}", s)));
        }
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" | "none" => Ok(LogLevel::Off),
            _ => Err(ConfigError::Invalid(format!("unknown log level: {}", s))),
        }
    }
}
