//! pt-session: Forwarding-session lifecycle manager
//!
//! Keeps at most one tunnel per (namespace, target) pair alive, runs each
//! tunnel's forward loop and readiness monitor in the background, and tears
//! sessions down on explicit stop requests or OS termination signals.

pub mod fault;
pub mod forwarder;
pub mod registry;
pub mod resolve;
pub mod session;
pub mod signal;
pub mod stop;

pub use fault::FaultSink;
pub use forwarder::{ForwardRequest, Forwarder};
pub use registry::SessionRegistry;
pub use resolve::resolve_target;
pub use session::{ForwardingSession, ReadySignal, SessionHandle};
pub use signal::{os_signals, shutdown_signal, SignalSource, SignalWatcher};
pub use stop::StopHandle;
