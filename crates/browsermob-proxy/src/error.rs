//! Error types shared by the client, factory and supervisor.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use crate::supervisor::Readiness;

const LOG_HINT: &str = "rerun with `log: true` to see engine output";

/// Errors that can occur while supervising or talking to the engine
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("engine executable not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("engine executable is not executable: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("failed to spawn engine {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {waited:?} waiting for the engine to start ({last}); {hint}", hint = LOG_HINT)]
    StartupTimeout { waited: Duration, last: Readiness },

    #[error("engine exited before becoming ready ({status}); {hint}", hint = LOG_HINT)]
    ProcessDied { status: ExitStatus },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("engine returned {status} for {method} {url}: {body}")]
    Engine {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to encode archive: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol(message.into())
    }

    /// True for failures raised before any process was spawned or request sent.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::PermissionDenied(_) | Error::InvalidArgument(_)
        )
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_errors_suggest_log_inheritance() {
        let err = Error::StartupTimeout {
            waited: Duration::from_secs(2),
            last: Readiness {
                listening: true,
                initialized: false,
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("listening: yes"));
        assert!(msg.contains("initialized: no"));
        assert!(msg.contains("log: true"));
    }

    #[test]
    fn test_usage_errors() {
        assert!(Error::NotFound(PathBuf::from("/nope")).is_usage_error());
        assert!(Error::invalid("bad key").is_usage_error());
        assert!(!Error::protocol("garbage").is_usage_error());
    }
}
