//! `forward` and `up`: open tunnels and keep them running until stopped

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::mpsc;

use crate::output::{format_tunnels, print_info, print_success};
use pt_core::config::{FaultPolicy, PtConfig};
use pt_core::{LogLevel, PortMapping, SessionFault};
use pt_kube::{ApiLookup, KubeconfigLoader, WsDialerFactory};
use pt_session::{FaultSink, ForwardRequest, Forwarder, SessionHandle};

/// How long to wait for the cause of a tunnel that closed before readiness
const FAULT_GRACE: Duration = Duration::from_secs(1);

/// Command-line overrides for one `forward` invocation
#[derive(Debug, Clone)]
pub struct ForwardArgs {
    pub namespace: String,
    pub target: String,
    pub ports: PortMapping,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub log_level: Option<LogLevel>,
}

/// Open one tunnel and run until interrupted
pub async fn forward_command(settings: &PtConfig, args: ForwardArgs) -> Result<()> {
    let (forwarder, mut faults) = build_forwarder(settings.fault_policy);

    let kubeconfig = args.kubeconfig.unwrap_or_else(|| settings.kubeconfig_path());
    let request = ForwardRequest::new(
        &args.namespace,
        &args.target,
        args.ports.local,
        args.ports.remote,
    )
    .with_kubeconfig(kubeconfig)
    .with_log_level(args.log_level.unwrap_or(settings.log_level))
    .with_context(args.context.or_else(|| settings.context.clone()).unwrap_or_default());

    let handle = forwarder
        .forward(request)
        .await
        .with_context(|| format!("Failed to forward {}/{}", args.namespace, args.target))?;
    let addr = wait_ready(&handle, &mut faults).await?;

    print_success(&format!(
        "Forwarding from {} -> {}/{}:{}",
        addr, args.namespace, args.target, args.ports.remote
    ));
    print_info("Press Ctrl+C to stop");

    supervise(&forwarder, faults).await
}

/// Open every configured tunnel and run until interrupted
pub async fn up_command(settings: &PtConfig) -> Result<()> {
    if settings.forwards.is_empty() {
        bail!("No [[forward]] entries configured");
    }

    let (forwarder, mut faults) = build_forwarder(settings.fault_policy);
    let mut handles = Vec::with_capacity(settings.forwards.len());

    for entry in &settings.forwards {
        let ports = entry
            .ports()
            .with_context(|| format!("Invalid ports for {}", entry.key()))?;
        let request =
            ForwardRequest::new(&entry.namespace, &entry.target, ports.local, ports.remote)
                .with_kubeconfig(settings.kubeconfig_path())
                .with_log_level(settings.log_level)
                .with_context(settings.context.clone().unwrap_or_default());

        let opened = match forwarder.forward(request).await {
            Ok(handle) => wait_ready(&handle, &mut faults).await.map(|_| handle),
            Err(e) => Err(e.into()),
        };
        match opened {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                forwarder.stop_all();
                return Err(e.context(format!("Failed to forward {}", entry.key())));
            }
        }
    }

    print_success(&format!("Opened {} tunnel(s)", handles.len()));
    println!("{}", format_tunnels(&handles));
    print_info("Press Ctrl+C to stop");

    supervise(&forwarder, faults).await
}

type FaultReceiver = Option<mpsc::UnboundedReceiver<SessionFault>>;

fn build_forwarder(policy: FaultPolicy) -> (Forwarder, FaultReceiver) {
    let forwarder = Forwarder::new(
        Arc::new(KubeconfigLoader),
        Arc::new(ApiLookup::new()),
        Arc::new(WsDialerFactory),
    );
    match policy {
        FaultPolicy::Terminate => (forwarder, None),
        FaultPolicy::Log => {
            let (sink, rx) = FaultSink::channel();
            (forwarder.with_fault_sink(sink), Some(rx))
        }
    }
}

async fn wait_ready(handle: &SessionHandle, faults: &mut FaultReceiver) -> Result<SocketAddr> {
    if let Some(addr) = handle.ready().wait().await {
        return Ok(addr);
    }

    // The cause, if any, arrives through the fault sink
    if let Some(rx) = faults {
        if let Ok(Some(fault)) = tokio::time::timeout(FAULT_GRACE, rx.recv()).await {
            return Err(fault.into());
        }
    }
    Err(anyhow!("Tunnel for {} closed before it became ready", handle.key()))
}

/// Run until every tunnel has stopped, or until the first fault
async fn supervise(forwarder: &Forwarder, faults: FaultReceiver) -> Result<()> {
    let Some(mut faults) = faults else {
        forwarder.registry().wait_idle().await;
        return Ok(());
    };

    tokio::select! {
        biased;
        Some(fault) = faults.recv() => {
            forwarder.stop_all();
            Err(fault.into())
        }
        _ = forwarder.registry().wait_idle() => {
            tracing::info!("All tunnels stopped");
            Ok(())
        }
    }
}
