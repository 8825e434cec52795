//! Delivery of faults raised after `forward` returned
//!
//! A running session has no return path to the caller that started it.
//! Faults go to a [`FaultSink`] chosen by the owner; when nobody consumes
//! them the process terminates, so a fault is never silently lost.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use pt_core::SessionFault;

/// Exit status used when a fault terminates the process
pub const FAULT_EXIT_CODE: i32 = 2;

type FaultCallback = Arc<dyn Fn(SessionFault) + Send + Sync>;

#[derive(Clone)]
enum Target {
    Terminate,
    Channel(mpsc::UnboundedSender<SessionFault>),
    Callback(FaultCallback),
}

/// Where post-launch faults are delivered
#[derive(Clone)]
pub struct FaultSink {
    target: Target,
}

impl FaultSink {
    /// Terminate the process on the first fault
    pub fn terminate() -> Self {
        Self {
            target: Target::Terminate,
        }
    }

    /// Deliver faults to a channel.
    ///
    /// If the receiver is gone when a fault arrives, the process terminates.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionFault>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                target: Target::Channel(tx),
            },
            rx,
        )
    }

    /// Hand each fault to `callback`
    pub fn callback(callback: impl Fn(SessionFault) + Send + Sync + 'static) -> Self {
        Self {
            target: Target::Callback(Arc::new(callback)),
        }
    }

    /// Deliver a fault
    pub fn report(&self, fault: SessionFault) {
        match &self.target {
            Target::Terminate => terminate(fault),
            Target::Channel(tx) => {
                if let Err(mpsc::error::SendError(fault)) = tx.send(fault) {
                    tracing::warn!("Fault receiver dropped, falling back to process termination");
                    terminate(fault);
                }
            }
            Target::Callback(callback) => callback(fault),
        }
    }
}

impl Default for FaultSink {
    fn default() -> Self {
        Self::terminate()
    }
}

impl fmt::Debug for FaultSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match self.target {
            Target::Terminate => "terminate",
            Target::Channel(_) => "channel",
            Target::Callback(_) => "callback",
        };
        f.debug_struct("FaultSink").field("target", &target).finish()
    }
}

fn terminate(fault: SessionFault) -> ! {
    tracing::error!("Unrecoverable fault: {}", fault);
    eprintln!("podtunnel: {}", fault);
    std::process::exit(FAULT_EXIT_CODE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pt_core::{FaultKind, SessionKey};
    use std::sync::Mutex;

    fn fault(msg: &str) -> SessionFault {
        SessionFault {
            key: SessionKey::new("test", "web"),
            kind: FaultKind::ErrorOutput(msg.into()),
        }
    }

    #[tokio::test]
    async fn test_channel_delivers_faults() {
        let (sink, mut rx) = FaultSink::channel();
        sink.report(fault("first"));
        sink.clone().report(fault("second"));

        let first = rx.recv().await.unwrap();
        assert!(first.to_string().contains("first"));
        let second = rx.recv().await.unwrap();
        assert!(second.to_string().contains("second"));
    }

    #[test]
    fn test_callback_receives_fault() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            FaultSink::callback(move |fault| seen.lock().unwrap().push(fault.key))
        };

        sink.report(fault("boom"));
        assert_eq!(seen.lock().unwrap().as_slice(), &[SessionKey::new("test", "web")]);
    }

    const CHILD_ENV: &str = "PT_FAULT_SINK_CHILD";

    /// Re-run `test` in a child process with `mode` set, returning its status
    fn run_child(test: &str, mode: &str) -> std::process::Output {
        let exe = std::env::current_exe().unwrap();
        std::process::Command::new(exe)
            .args([test, "--exact", "--nocapture", "--test-threads=1"])
            .env(CHILD_ENV, mode)
            .output()
            .unwrap()
    }

    #[test]
    fn test_dropped_receiver_terminates_process() {
        if std::env::var(CHILD_ENV).as_deref() == Ok("channel") {
            let (sink, rx) = FaultSink::channel();
            drop(rx);
            sink.report(fault("orphaned"));
            // only reached if the fallback did not exit
            std::process::exit(0);
        }

        let output = run_child(
            "fault::tests::test_dropped_receiver_terminates_process",
            "channel",
        );
        assert_eq!(output.status.code(), Some(FAULT_EXIT_CODE));
        assert!(String::from_utf8_lossy(&output.stderr).contains("orphaned"));
    }

    #[test]
    fn test_terminate_sink_exits_with_fault_code() {
        if std::env::var(CHILD_ENV).as_deref() == Ok("terminate") {
            FaultSink::terminate().report(fault("fatal"));
            std::process::exit(0);
        }

        let output = run_child(
            "fault::tests::test_terminate_sink_exits_with_fault_code",
            "terminate",
        );
        assert_eq!(output.status.code(), Some(FAULT_EXIT_CODE));
        assert!(String::from_utf8_lossy(&output.stderr).contains("podtunnel: "));
    }

    #[test]
    fn test_debug_names_target() {
        assert!(format!("{:?}", FaultSink::default()).contains("terminate"));
        let (sink, _rx) = FaultSink::channel();
        assert!(format!("{:?}", sink).contains("channel"));
    }
}
