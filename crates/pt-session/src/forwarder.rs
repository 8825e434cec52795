//! Public entry point: open and close tunnels
//!
//! [`Forwarder::forward`] runs the full sequence for one tunnel:
//!
//! 1. load credentials
//! 2. resolve the target (service first, then pod)
//! 3. build a dialer bound to the target
//! 4. prepare the session (synchronous, nothing runs yet)
//! 5. launch its background tasks
//! 6. register it, replacing any session under the same key
//! 7. attach a signal watcher
//!
//! Any failure before step 5 leaves nothing behind. From step 5 on the call
//! cannot fail.

use std::path::PathBuf;
use std::sync::Arc;

use pt_core::debug::debug_print;
use pt_core::traits::{CredentialLoader, DialOptions, DialerFactory, TargetLookup};
use pt_core::{LogLevel, PortMapping, PtError, SessionKey};

use crate::fault::FaultSink;
use crate::registry::SessionRegistry;
use crate::resolve::resolve_target;
use crate::session::{ForwardingSession, SessionHandle};
use crate::signal::{os_signals, SignalSource, SignalWatcher};

/// Parameters of one `forward` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRequest {
    pub namespace: String,
    /// Service or pod name
    pub target: String,
    /// Local port (0 lets the OS choose)
    pub local_port: u16,
    /// Port inside the target
    pub remote_port: u16,
    /// Kubeconfig path; empty means the loader's default
    pub kubeconfig: PathBuf,
    pub log_level: LogLevel,
    /// Context overriding the kubeconfig's current context
    pub context: Option<String>,
}

impl ForwardRequest {
    pub fn new(
        namespace: impl Into<String>,
        target: impl Into<String>,
        local_port: u16,
        remote_port: u16,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            target: target.into(),
            local_port,
            remote_port,
            kubeconfig: PathBuf::new(),
            log_level: LogLevel::default(),
            context: None,
        }
    }

    pub fn with_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = path.into();
        self
    }

    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// Override the context. An empty name keeps the current context.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        self.context = (!context.is_empty()).then_some(context);
        self
    }

    /// Registry key of the tunnel
    pub fn key(&self) -> SessionKey {
        SessionKey::new(&self.namespace, &self.target)
    }
}

/// Opens tunnels and tracks them in a [`SessionRegistry`]
pub struct Forwarder {
    registry: Arc<SessionRegistry>,
    credentials: Arc<dyn CredentialLoader>,
    lookup: Arc<dyn TargetLookup>,
    dialers: Arc<dyn DialerFactory>,
    faults: FaultSink,
    signals: Option<SignalSource>,
}

impl Forwarder {
    /// Create a forwarder with its own registry, terminating the process on
    /// post-launch faults and stopping sessions on SIGINT/SIGTERM
    pub fn new(
        credentials: Arc<dyn CredentialLoader>,
        lookup: Arc<dyn TargetLookup>,
        dialers: Arc<dyn DialerFactory>,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            credentials,
            lookup,
            dialers,
            faults: FaultSink::default(),
            signals: Some(os_signals()),
        }
    }

    /// Share an existing registry
    pub fn with_registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Deliver post-launch faults to `faults`
    pub fn with_fault_sink(mut self, faults: FaultSink) -> Self {
        self.faults = faults;
        self
    }

    /// Replace the signal source watchers wait on; `None` disables watchers
    pub fn with_signals(mut self, signals: Option<SignalSource>) -> Self {
        self.signals = signals;
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Open a tunnel for `request`.
    ///
    /// Returns once the tunnel is launched and registered; it keeps running
    /// in the background until stopped.
    pub async fn forward(&self, request: ForwardRequest) -> Result<SessionHandle, PtError> {
        debug_print(format!("level={}", request.log_level as i32));
        let key = request.key();

        let credentials = self
            .credentials
            .load(&request.kubeconfig, request.context.as_deref())?;
        tracing::debug!("Loaded credentials for {}", credentials.server);

        let target = resolve_target(
            self.lookup.as_ref(),
            &credentials,
            &request.namespace,
            &request.target,
        )
        .await?;

        let options = DialOptions {
            report_errors: !request.log_level.is_off(),
        };
        if !options.report_errors {
            debug_print("Turned off transport error reporting");
        }
        let dialer = self.dialers.dialer(&credentials, &target, options)?;

        let ports = PortMapping::new(request.local_port, request.remote_port)?;
        let session = ForwardingSession::prepare(key.clone(), dialer.as_ref(), ports)?
            .with_log_level(request.log_level);

        let handle = session.launch(Arc::clone(&self.registry), self.faults.clone());
        self.registry.register(key.clone(), handle.stop_handle().clone());

        if let Some(signals) = &self.signals {
            SignalWatcher::attach_with(
                Arc::clone(&self.registry),
                key,
                handle.stop_handle().clone(),
                signals(),
            );
        }

        tracing::info!("Forwarding {} via {} ({})", handle.key(), target, ports);
        Ok(handle)
    }

    /// Stop the tunnel for `namespace`/`target`, if any
    pub fn stop_forwarding(&self, namespace: &str, target: &str) {
        self.registry.stop(&SessionKey::new(namespace, target));
    }

    /// Stop every tunnel
    pub fn stop_all(&self) {
        let stopped = self.registry.stop_all();
        if !stopped.is_empty() {
            tracing::info!("Stopped {} session(s)", stopped.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = ForwardRequest::new("test", "web", 8080, 80)
            .with_kubeconfig("/tmp/kubeconfig")
            .with_log_level(LogLevel::Off)
            .with_context("");

        assert_eq!(request.key(), SessionKey::new("test", "web"));
        assert_eq!(request.kubeconfig, PathBuf::from("/tmp/kubeconfig"));
        assert_eq!(request.context, None);
        assert!(request.log_level.is_off());

        let request = request.with_context("staging");
        assert_eq!(request.context.as_deref(), Some("staging"));
    }
}
