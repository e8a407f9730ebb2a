/// The supervisor loop: run the command, restart it on a too-many-errors
/// trigger, stop on anything else.
use tokio::time::sleep;

use crate::config::SupervisorConfig;
use crate::session::{self, RunOutcome, SessionError};
use crate::signals::{self, CurrentChild};

/// What the loop did before stopping.
#[derive(Debug)]
pub struct LoopSummary {
    /// Restarts performed (the first run is not a restart).
    pub restarts: u32,
    /// Outcome of the final run.
    pub outcome: RunOutcome,
}

/// Drive runs of the supervised command until a terminal outcome.
///
/// Every run starts fresh: a new child and an empty occurrence log. The
/// signal forwarder is installed once for the whole loop and always
/// targets whichever child is current.
pub async fn run(config: &SupervisorConfig) -> Result<LoopSummary, SessionError> {
    let current = CurrentChild::new();
    let _forwarder = signals::spawn_forwarder(current.clone());

    let mut restarts: u32 = 0;
    loop {
        match session::run_session(config, &current).await {
            Ok(RunOutcome::TooManyErrors) => {
                if let Some(max) = config.tuning.max_restarts {
                    if restarts >= max {
                        tracing::warn!(restarts, "restart limit reached, giving up");
                        return Ok(LoopSummary {
                            restarts,
                            outcome: RunOutcome::TooManyErrors,
                        });
                    }
                }
                restarts += 1;
                tracing::info!(restarts, "too many errors, restarting process");
                sleep(config.tuning.restart_delay).await;
            }
            Ok(outcome @ RunOutcome::Exited { .. }) => {
                return Ok(LoopSummary { restarts, outcome });
            }
            // A missing or broken command is not transient; it is
            // reported, never retried.
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use std::time::Duration;

    fn test_config(
        command: &str,
        args: &[&str],
        count_limit: u32,
        max_restarts: Option<u32>,
    ) -> SupervisorConfig {
        SupervisorConfig {
            pattern: "PANIC".to_string(),
            count_limit,
            window: Duration::from_secs(5),
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            tuning: Tuning {
                restart_delay: Duration::from_millis(10),
                exit_grace: Duration::from_millis(10),
                max_restarts,
            },
        }
    }

    #[tokio::test]
    async fn test_clean_run_does_not_restart() {
        let config = test_config("echo", &["hello"], 3, Some(5));
        let summary = run(&config).await.unwrap();
        assert_eq!(summary.restarts, 0);
        assert_eq!(summary.outcome, RunOutcome::Exited { exit_code: Some(0) });
    }

    #[tokio::test]
    async fn test_nonzero_exit_stops_the_loop() {
        let config = test_config("sh", &["-c", "exit 3"], 3, Some(5));
        let summary = run(&config).await.unwrap();
        assert_eq!(summary.restarts, 0);
        assert_eq!(summary.outcome, RunOutcome::Exited { exit_code: Some(3) });
    }

    #[tokio::test]
    async fn test_too_many_errors_restarts_until_limit() {
        // Each run trips the detector, so the loop restarts (with fresh
        // per-run state) until the configured cap stops it.
        let config = test_config(
            "sh",
            &["-c", "echo PANIC; echo PANIC; echo PANIC"],
            3,
            Some(2),
        );
        let summary = run(&config).await.unwrap();
        assert_eq!(summary.restarts, 2);
        assert_eq!(summary.outcome, RunOutcome::TooManyErrors);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_not_retried() {
        let config = test_config("nonexistent-binary-xyz", &[], 3, None);
        let err = run(&config).await.unwrap_err();
        assert!(matches!(err, SessionError::Spawn { .. }));
    }
}
