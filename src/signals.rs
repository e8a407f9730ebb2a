/// Signal handling: relay SIGINT/SIGTERM from the supervisor to
/// whichever child process is current.
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

/// Shared slot naming whichever child is current.
///
/// The session swaps the PID in at spawn and out the instant a run
/// outcome is determined; the forwarder only ever reads it. Zero means
/// no child is running.
#[derive(Clone, Debug, Default)]
pub struct CurrentChild {
    pid: Arc<AtomicI32>,
}

impl CurrentChild {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, pid: i32) {
        self.pid.store(pid, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.pid.store(0, Ordering::SeqCst);
    }

    pub fn get(&self) -> Option<i32> {
        match self.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }
}

/// Deliver a signal to a child process.
///
/// The target may have exited a moment ago; the resulting OS error is
/// returned for logging and is never escalated.
pub fn forward_to(pid: i32, sig: Signal) -> nix::Result<()> {
    kill(Pid::from_raw(pid), sig)
}

/// Relay SIGINT and SIGTERM to the current child for the supervisor's
/// whole lifetime. One task, independent of how many times the child is
/// restarted; with no child running, the signal is logged and dropped.
pub fn spawn_forwarder(current: CurrentChild) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGINT handler");
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };

        loop {
            let sig = tokio::select! {
                received = sigint.recv() => {
                    if received.is_none() {
                        break;
                    }
                    Signal::SIGINT
                }
                received = sigterm.recv() => {
                    if received.is_none() {
                        break;
                    }
                    Signal::SIGTERM
                }
            };
            match current.get() {
                Some(pid) => {
                    tracing::info!(signal = %sig, pid, "forwarding signal to child");
                    if let Err(e) = forward_to(pid, sig) {
                        tracing::warn!(signal = %sig, pid, error = %e, "could not signal child");
                    }
                }
                None => {
                    tracing::info!(signal = %sig, "signal received with no child running");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::Stdio;
    use tokio::process::Command;

    #[test]
    fn test_current_child_starts_empty() {
        let current = CurrentChild::new();
        assert_eq!(current.get(), None);
    }

    #[test]
    fn test_current_child_swaps_at_run_boundaries() {
        let current = CurrentChild::new();
        current.set(1234);
        assert_eq!(current.get(), Some(1234));

        // Clones observe the same slot.
        let other = current.clone();
        other.clear();
        assert_eq!(current.get(), None);

        current.set(5678);
        assert_eq!(other.get(), Some(5678));
    }

    #[tokio::test]
    async fn test_forward_terminates_running_child() {
        let mut child = Command::new("sleep")
            .arg("5")
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        let pid = child.id().unwrap() as i32;

        forward_to(pid, Signal::SIGTERM).unwrap();

        let status = child.wait().await.unwrap();
        assert!(!status.success());
        assert_eq!(status.signal(), Some(Signal::SIGTERM as i32));
    }

    #[tokio::test]
    async fn test_forward_to_exited_child_is_harmless() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id().unwrap() as i32;
        child.wait().await.unwrap();

        // The PID is gone (modulo reuse); the error is reported, not
        // escalated, and nothing crashes.
        let _ = forward_to(pid, Signal::SIGINT);
    }
}
