//! Forwarding session
//!
//! One session owns one tunnel from preparation to teardown:
//!
//! 1. [`ForwardingSession::prepare`] builds the tunnel synchronously. A
//!    failure here is returned to the caller and nothing runs yet.
//! 2. [`ForwardingSession::launch`] spawns the readiness/error monitor and
//!    the forward loop, then returns a [`SessionHandle`] immediately.
//!
//! The forward loop runs until the session's [`StopHandle`] fires. Faults
//! seen after launch are reported through the [`FaultSink`].

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;

use pt_core::traits::{OutputLine, Tunnel, TunnelContext, TunnelDialer, TunnelEvents};
use pt_core::{FaultKind, LogLevel, PortMapping, SessionFault, SessionKey, TransportError};

use crate::fault::FaultSink;
use crate::registry::SessionRegistry;
use crate::stop::StopHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadyState {
    Pending,
    Ready(SocketAddr),
    Closed,
}

/// Resolves once the tunnel accepts local connections
#[derive(Debug, Clone)]
pub struct ReadySignal(watch::Receiver<ReadyState>);

impl ReadySignal {
    /// Wait for readiness. Returns the bound local address, or `None` if
    /// the tunnel ended without becoming ready.
    pub async fn wait(&self) -> Option<SocketAddr> {
        let mut rx = self.0.clone();
        let state = match rx.wait_for(|state| *state != ReadyState::Pending).await {
            Ok(state) => *state,
            Err(_) => ReadyState::Closed,
        };
        match state {
            ReadyState::Ready(addr) => Some(addr),
            _ => None,
        }
    }

    /// Bound local address, if the tunnel is ready
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match *self.0.borrow() {
            ReadyState::Ready(addr) => Some(addr),
            _ => None,
        }
    }
}

/// Handle to a launched session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    key: SessionKey,
    ports: PortMapping,
    stop: StopHandle,
    ready: ReadySignal,
}

impl SessionHandle {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn ports(&self) -> PortMapping {
        self.ports
    }

    pub fn stop_handle(&self) -> &StopHandle {
        &self.stop
    }

    pub fn ready(&self) -> &ReadySignal {
        &self.ready
    }

    /// Whether teardown was requested
    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }
}

/// A prepared, not yet running, tunnel session
pub struct ForwardingSession {
    key: SessionKey,
    ports: PortMapping,
    log_level: LogLevel,
    tunnel: Box<dyn Tunnel>,
    stop: StopHandle,
}

impl ForwardingSession {
    /// Build the tunnel for `ports` through `dialer`
    pub fn prepare(
        key: SessionKey,
        dialer: &dyn TunnelDialer,
        ports: PortMapping,
    ) -> Result<Self, TransportError> {
        let tunnel = dialer.prepare(ports)?;
        Ok(Self {
            key,
            ports,
            log_level: LogLevel::default(),
            tunnel,
            stop: StopHandle::new(),
        })
    }

    /// Set the level gating the tunnel's own output
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Stop handle of the session, before launch
    pub fn stop_handle(&self) -> &StopHandle {
        &self.stop
    }

    /// Start the monitor and the forward loop.
    ///
    /// `registry` is only used to deregister the session when it ends or faults
    /// on its own; registration itself is the caller's job.
    pub fn launch(self, registry: Arc<SessionRegistry>, faults: FaultSink) -> SessionHandle {
        let Self {
            key,
            ports,
            log_level,
            tunnel,
            stop,
        } = self;

        let (ctx, events) = TunnelContext::new(stop.token());
        let (ready_tx, ready_rx) = watch::channel(ReadyState::Pending);

        tokio::spawn(monitor(
            key.clone(),
            log_level,
            events,
            ready_tx,
            Teardown {
                stop: stop.clone(),
                registry: Arc::clone(&registry),
            },
            faults.clone(),
        ));
        tokio::spawn(forward_loop(
            key.clone(),
            tunnel,
            ctx,
            Teardown {
                stop: stop.clone(),
                registry,
            },
            faults,
        ));

        tracing::debug!("Launched session {} ({})", key, ports);

        SessionHandle {
            key,
            ports,
            stop,
            ready: ReadySignal(ready_rx),
        }
    }
}

/// What a task needs to take its session down
struct Teardown {
    stop: StopHandle,
    registry: Arc<SessionRegistry>,
}

impl Teardown {
    /// Stop the session and drop it from the registry, unless it was replaced
    fn run(&self, key: &SessionKey) {
        self.stop.signal();
        self.registry.stop_if_current(key, &self.stop);
    }
}

/// Wait for readiness, escalate error output written until then, then keep
/// draining output until the tunnel drops its end.
async fn monitor(
    key: SessionKey,
    log_level: LogLevel,
    mut events: TunnelEvents,
    ready_tx: watch::Sender<ReadyState>,
    teardown: Teardown,
    faults: FaultSink,
) {
    let state = match (&mut events.ready).await {
        Ok(addr) => ReadyState::Ready(addr),
        Err(_) => ReadyState::Closed,
    };

    let mut errors = Vec::new();
    while let Ok(line) = events.output.try_recv() {
        match line {
            OutputLine::Info(msg) => log_info(&key, log_level, &msg),
            OutputLine::Error(msg) => errors.push(msg),
        }
    }

    if !errors.is_empty() {
        ready_tx.send_replace(ReadyState::Closed);
        teardown.run(&key);
        faults.report(SessionFault {
            key,
            kind: FaultKind::ErrorOutput(errors.join("\n")),
        });
        return;
    }

    ready_tx.send_replace(state);
    if let ReadyState::Ready(addr) = state {
        tracing::info!("Session {} ready on {}", key, addr);
    }

    while let Some(line) = events.output.recv().await {
        match line {
            OutputLine::Info(msg) => log_info(&key, log_level, &msg),
            OutputLine::Error(msg) => {
                if log_level <= LogLevel::Error {
                    tracing::error!("[{}] {}", key, msg);
                }
            }
        }
    }
}

fn log_info(key: &SessionKey, log_level: LogLevel, msg: &str) {
    if log_level <= LogLevel::Debug {
        tracing::debug!("[{}] {}", key, msg);
    }
}

async fn forward_loop(
    key: SessionKey,
    tunnel: Box<dyn Tunnel>,
    ctx: TunnelContext,
    teardown: Teardown,
    faults: FaultSink,
) {
    let result = tunnel.run(ctx).await;
    let requested = teardown.stop.is_stopped();

    // A tunnel that ended on its own must not stay reachable from the registry
    teardown.run(&key);

    match result {
        Ok(()) if requested => tracing::debug!("Session {} stopped", key),
        Ok(()) => tracing::info!("Session {} closed by its tunnel", key),
        Err(e) if requested => {
            tracing::debug!("Session {} ended with error after stop: {}", key, e)
        }
        Err(e) => faults.report(SessionFault {
            key,
            kind: FaultKind::ForwardFailed(e),
        }),
    }
}
