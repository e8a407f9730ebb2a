/// Single run lifecycle: spawn the supervised command, merge and tee its
/// output, scan for the error signature, and classify how the run ended.
use std::io::Write;
use std::process::Stdio;
use std::time::Instant;

use nix::sys::signal::Signal;
use tokio::process::Command;

use crate::config::SupervisorConfig;
use crate::detector::{ErrorWindow, LineScanner};
use crate::mux::MergedOutput;
use crate::signals::{self, CurrentChild};

/// How one run of the supervised command ended.
#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The child exited on its own. Non-zero codes are not errors at
    /// this layer; only the pattern/window policy defines "error".
    Exited {
        /// Process exit code (None if killed by a signal).
        exit_code: Option<i32>,
    },
    /// The error pattern crossed the threshold and the child was
    /// interrupted. The supervisor loop restarts on this outcome.
    TooManyErrors,
}

/// Errors that can occur during a run.
#[derive(Debug)]
pub enum SessionError {
    /// Failed to spawn the supervised command.
    Spawn { source: std::io::Error },
    /// Failed waiting on the child process.
    Io { source: std::io::Error },
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Spawn { source } => {
                write!(f, "failed to spawn supervised command: {}", source)
            }
            SessionError::Io { source } => {
                write!(f, "I/O error during run: {}", source)
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Spawn { source } => Some(source),
            SessionError::Io { source } => Some(source),
        }
    }
}

/// Run the supervised command once.
///
/// Both pipes exist from the moment of spawn, so early output sits in
/// the pipe until the drain tasks pick it up and the child never blocks
/// on an unread, unconnected stream. Every merged chunk is echoed to the
/// supervisor's stdout verbatim before its lines reach the detector.
pub async fn run_session(
    config: &SupervisorConfig,
    current: &CurrentChild,
) -> Result<RunOutcome, SessionError> {
    tracing::info!(
        command = %config.command,
        args = ?config.args,
        "starting supervised process"
    );
    let start = Instant::now();

    let mut child = Command::new(&config.command)
        .args(&config.args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| SessionError::Spawn { source: e })?;

    let pid = child.id().map(|p| p as i32).unwrap_or(0);
    current.set(pid);

    let mut merged = MergedOutput::new(child.stdout.take(), child.stderr.take());
    let mut scanner = LineScanner::new();
    let mut window = ErrorWindow::new(&config.pattern, config.count_limit, config.window);

    while let Some(chunk) = merged.recv().await {
        tee(&chunk);
        for line in scanner.push_chunk(&chunk) {
            fire_if_triggered(&mut window, &line, pid, config);
        }
    }
    if let Some(last) = scanner.finish() {
        fire_if_triggered(&mut window, &last, pid, config);
    }

    // Merged EOF normally means the child is exiting; collect its status
    // and release the handle the instant the outcome is known.
    let wait_result = child.wait().await;
    current.clear();
    let status = wait_result.map_err(|e| SessionError::Io { source: e })?;

    let outcome = if window.fired() {
        RunOutcome::TooManyErrors
    } else {
        RunOutcome::Exited {
            exit_code: status.code(),
        }
    };
    tracing::info!(
        command = %config.command,
        outcome = ?outcome,
        duration_ms = start.elapsed().as_millis() as u64,
        "supervised process stopped"
    );
    Ok(outcome)
}

/// Echo child bytes to our stdout, unmodified, before scanning them.
fn tee(chunk: &[u8]) {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let _ = out.write_all(chunk);
    let _ = out.flush();
}

fn fire_if_triggered(window: &mut ErrorWindow, line: &str, pid: i32, config: &SupervisorConfig) {
    if window.observe(line) {
        tracing::warn!(
            pattern = %config.pattern,
            count_limit = config.count_limit,
            window = ?config.window,
            "error threshold exceeded, interrupting process"
        );
        // Interrupt, not kill: the child is expected to exit on its own
        // and close its streams, which ends this run's drain naturally.
        if pid > 0 {
            if let Err(e) = signals::forward_to(pid, Signal::SIGINT) {
                tracing::warn!(pid, error = %e, "could not interrupt process");
            }
        }
    }
}
