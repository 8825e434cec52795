//! Forwarder integration tests
//!
//! Runs the full forward sequence against in-memory collaborators and a
//! loopback tunnel that echoes bytes back instead of reaching a cluster.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::timeout;

use pt_core::traits::{
    CredentialLoader, DialOptions, DialerFactory, Lookup, TargetLookup, Tunnel, TunnelContext,
    TunnelDialer,
};
use pt_core::{
    ClusterCredentials, ConfigError, FaultKind, LogLevel, PortMapping, PtError, ResolveError,
    SessionKey, TargetIdentity, TargetKind, TransportError,
};
use pt_session::{FaultSink, ForwardRequest, Forwarder, SignalSource};

const WAIT: Duration = Duration::from_secs(5);

struct StaticCredentials;

impl CredentialLoader for StaticCredentials {
    fn load(&self, path: &Path, context: Option<&str>) -> Result<ClusterCredentials, ConfigError> {
        if path.ends_with("missing") {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let mut creds = ClusterCredentials::new("https://1.2.3.4:6443");
        creds.context = context.map(str::to_string);
        Ok(creds)
    }
}

/// Knows services `web` and `db` and pod `worker-0`
struct Inventory;

#[async_trait]
impl TargetLookup for Inventory {
    async fn lookup(
        &self,
        _credentials: &ClusterCredentials,
        kind: TargetKind,
        _namespace: &str,
        name: &str,
    ) -> Result<Lookup, ResolveError> {
        let known = match kind {
            TargetKind::Service => ["web", "db"].contains(&name),
            TargetKind::Pod => name == "worker-0",
        };
        Ok(if known { Lookup::Found } else { Lookup::Missing })
    }
}

/// Builds loopback dialers and records what it was asked for
#[derive(Default)]
struct LoopbackFactory {
    dialed: Mutex<Vec<(TargetIdentity, DialOptions)>>,
}

impl DialerFactory for LoopbackFactory {
    fn dialer(
        &self,
        _credentials: &ClusterCredentials,
        target: &TargetIdentity,
        options: DialOptions,
    ) -> Result<Box<dyn TunnelDialer>, TransportError> {
        self.dialed.lock().unwrap().push((target.clone(), options));
        Ok(Box::new(LoopbackDialer))
    }
}

struct LoopbackDialer;

impl TunnelDialer for LoopbackDialer {
    fn prepare(&self, ports: PortMapping) -> Result<Box<dyn Tunnel>, TransportError> {
        Ok(Box::new(LoopbackTunnel(ports)))
    }
}

/// Listens locally and echoes every connection
struct LoopbackTunnel(PortMapping);

#[async_trait]
impl Tunnel for LoopbackTunnel {
    async fn run(self: Box<Self>, ctx: TunnelContext) -> Result<(), TransportError> {
        let listener = TcpListener::bind(("127.0.0.1", self.0.local)).await?;
        let addr = listener.local_addr()?;
        ctx.output
            .info(format!("Forwarding from {} -> {}", addr, self.0.remote));
        ctx.ready.notify(addr);

        loop {
            tokio::select! {
                _ = ctx.stop.cancelled() => return Ok(()),
                accepted = listener.accept() => {
                    let (mut stream, _) = accepted?;
                    tokio::spawn(async move {
                        let (mut reader, mut writer) = stream.split();
                        let _ = tokio::io::copy(&mut reader, &mut writer).await;
                    });
                }
            }
        }
    }
}

fn forwarder() -> (Forwarder, Arc<LoopbackFactory>) {
    let factory = Arc::new(LoopbackFactory::default());
    let forwarder = Forwarder::new(
        Arc::new(StaticCredentials),
        Arc::new(Inventory),
        Arc::clone(&factory) as Arc<dyn DialerFactory>,
    )
    .with_signals(None);
    (forwarder, factory)
}

async fn echo(port: u16, payload: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(payload).await.unwrap();
    let mut buf = vec![0u8; payload.len()];
    stream.read_exact(&mut buf).await.unwrap();
    buf
}

#[tokio::test]
async fn test_forward_copies_bytes_until_stopped() {
    let (forwarder, factory) = forwarder();
    let handle = forwarder
        .forward(ForwardRequest::new("test", "web", 0, 80))
        .await
        .unwrap();

    let addr = timeout(WAIT, handle.ready().wait()).await.unwrap().unwrap();
    assert_eq!(echo(addr.port(), b"ping").await, b"ping");

    let dialed = factory.dialed.lock().unwrap().clone();
    assert_eq!(dialed.len(), 1);
    assert_eq!(dialed[0].0, TargetIdentity::new("test", TargetKind::Service, "web"));
    assert!(dialed[0].1.report_errors);

    assert!(forwarder.registry().contains(&SessionKey::new("test", "web")));
    forwarder.stop_forwarding("test", "web");
    assert!(handle.is_stopped());
    assert!(forwarder.registry().is_empty());

    // the listener goes away once the forward loop observes the stop
    timeout(WAIT, async {
        while TcpStream::connect(addr).await.is_ok() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_forward_resolves_pods_after_services() {
    let (forwarder, factory) = forwarder();
    forwarder
        .forward(ForwardRequest::new("test", "worker-0", 0, 9000))
        .await
        .unwrap();

    let dialed = factory.dialed.lock().unwrap().clone();
    assert_eq!(dialed[0].0.kind, TargetKind::Pod);
    forwarder.stop_all();
}

#[tokio::test]
async fn test_second_forward_replaces_first() {
    let (forwarder, _) = forwarder();
    let first = forwarder
        .forward(ForwardRequest::new("test", "web", 0, 80))
        .await
        .unwrap();
    let second = forwarder
        .forward(ForwardRequest::new("test", "web", 0, 8080))
        .await
        .unwrap();

    assert!(first.is_stopped());
    assert!(!second.is_stopped());
    assert_eq!(forwarder.registry().len(), 1);

    let addr = timeout(WAIT, second.ready().wait()).await.unwrap().unwrap();
    assert_eq!(echo(addr.port(), b"second").await, b"second");
    forwarder.stop_forwarding("test", "web");
}

#[tokio::test]
async fn test_unknown_target_fails_cleanly() {
    let (forwarder, factory) = forwarder();
    let err = forwarder
        .forward(ForwardRequest::new("test", "ghost", 0, 80))
        .await
        .unwrap_err();

    assert!(matches!(err, PtError::Resolve(ResolveError::NotFound { .. })));
    assert!(err
        .to_string()
        .contains("no service or pod with name ghost found"));
    assert!(factory.dialed.lock().unwrap().is_empty());
    assert!(forwarder.registry().is_empty());
}

#[tokio::test]
async fn test_credential_errors_propagate() {
    let (forwarder, _) = forwarder();
    let err = forwarder
        .forward(ForwardRequest::new("test", "web", 0, 80).with_kubeconfig("/nowhere/missing"))
        .await
        .unwrap_err();

    assert!(matches!(err, PtError::Config(ConfigError::NotFound(_))));
    assert!(forwarder.registry().is_empty());
}

#[tokio::test]
async fn test_invalid_ports_fail_before_launch() {
    let (forwarder, _) = forwarder();
    let err = forwarder
        .forward(ForwardRequest::new("test", "web", 8080, 0))
        .await
        .unwrap_err();

    assert!(matches!(err, PtError::Transport(TransportError::InvalidPorts(_))));
    assert!(forwarder.registry().is_empty());
}

#[tokio::test]
async fn test_log_level_off_disables_error_reporting() {
    let (forwarder, factory) = forwarder();
    forwarder
        .forward(ForwardRequest::new("test", "db", 0, 5432).with_log_level(LogLevel::Off))
        .await
        .unwrap();

    let dialed = factory.dialed.lock().unwrap().clone();
    assert!(!dialed[0].1.report_errors);
    forwarder.stop_all();
}

#[tokio::test]
async fn test_signal_stops_registered_session() {
    let (signal_tx, _) = broadcast::channel::<()>(1);
    let source: SignalSource = {
        let signal_tx = signal_tx.clone();
        Arc::new(move || {
            let mut rx = signal_tx.subscribe();
            Box::pin(async move {
                let _ = rx.recv().await;
            })
        })
    };

    let (forwarder, _) = forwarder();
    let forwarder = forwarder.with_signals(Some(source));
    let handle = forwarder
        .forward(ForwardRequest::new("test", "web", 0, 80))
        .await
        .unwrap();
    timeout(WAIT, handle.ready().wait()).await.unwrap().unwrap();

    signal_tx.send(()).unwrap();
    timeout(WAIT, forwarder.registry().wait_idle()).await.unwrap();
    assert!(handle.is_stopped());
}

#[tokio::test]
async fn test_bind_failure_reaches_fault_sink() {
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = occupied.local_addr().unwrap().port();

    let (faults, mut fault_rx) = FaultSink::channel();
    let (forwarder, _) = forwarder();
    let forwarder = forwarder.with_fault_sink(faults);

    // forward succeeds; the failure surfaces asynchronously
    let handle = forwarder
        .forward(ForwardRequest::new("test", "web", port, 80))
        .await
        .unwrap();

    let fault = timeout(WAIT, fault_rx.recv()).await.unwrap().unwrap();
    assert_eq!(fault.key, SessionKey::new("test", "web"));
    assert!(matches!(
        fault.kind,
        FaultKind::ForwardFailed(TransportError::Io(_))
    ));
    assert_eq!(handle.ready().wait().await, None);
    assert!(forwarder.registry().is_empty());
}
