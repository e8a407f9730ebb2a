use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fully resolved invocation parameters, immutable for the supervisor's
/// lifetime.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Literal substring that marks an error line in the child's output.
    pub pattern: String,
    /// Matches inside the window that trigger a restart (>= 1).
    pub count_limit: u32,
    /// Sliding time window (> 0).
    pub window: Duration,
    /// Command to supervise, executed without shell interpretation.
    pub command: String,
    /// Arguments passed to the command.
    pub args: Vec<String>,
    pub tuning: Tuning,
}

/// Tuning knobs loaded from respawn.toml; CLI flags override.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Pause between a too-many-errors stop and the next spawn.
    /// A fixed short delay, deliberately not exponential backoff.
    #[serde(with = "humantime_serde")]
    pub restart_delay: Duration,
    /// Grace sleep before the supervisor exits, lets log lines flush.
    #[serde(with = "humantime_serde")]
    pub exit_grace: Duration,
    /// Stop after this many restarts (absent = keep restarting).
    pub max_restarts: Option<u32>,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_millis(10),
            exit_grace: Duration::from_millis(10),
            max_restarts: None,
        }
    }
}

/// Errors loading the tuning file.
#[derive(Debug)]
pub enum ConfigError {
    /// The file exists but could not be read.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file is not valid TOML for the tuning schema.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read tuning file {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid tuning file {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl Tuning {
    /// Load tuning from a TOML file. A missing file yields the defaults;
    /// a malformed one is a fatal configuration error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let tuning = Tuning::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(tuning.restart_delay, Duration::from_millis(10));
        assert_eq!(tuning.exit_grace, Duration::from_millis(10));
        assert_eq!(tuning.max_restarts, None);
    }

    #[test]
    fn test_load_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("respawn.toml");
        std::fs::write(
            &path,
            "restart_delay = \"250ms\"\nexit_grace = \"1s\"\nmax_restarts = 3\n",
        )
        .unwrap();

        let tuning = Tuning::load(&path).unwrap();
        assert_eq!(tuning.restart_delay, Duration::from_millis(250));
        assert_eq!(tuning.exit_grace, Duration::from_secs(1));
        assert_eq!(tuning.max_restarts, Some(3));
    }

    #[test]
    fn test_partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("respawn.toml");
        std::fs::write(&path, "max_restarts = 7\n").unwrap();

        let tuning = Tuning::load(&path).unwrap();
        assert_eq!(tuning.max_restarts, Some(7));
        assert_eq!(tuning.restart_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_malformed_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("respawn.toml");
        std::fs::write(&path, "restart_delay = \"not a duration\"\n").unwrap();

        let err = Tuning::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("invalid tuning file"));
    }
}
