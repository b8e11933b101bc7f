//! Configuration for the engine supervisor and the control client.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// HTTP client settings for talking to the engine control API
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ClientConfig {
    /// Per-request timeout. HAR downloads can be large, so this is generous.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Build the shared HTTP client
    pub fn build_http_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(self.request_timeout())
            .build()?)
    }
}

/// Engine process settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Path to the engine executable (e.g. `bin/browsermob-proxy`)
    pub path: PathBuf,

    /// Host used to reach the engine once started
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the engine binds its control API to
    #[serde(default = "default_port")]
    pub port: u16,

    /// How long `start` waits for the engine to become ready
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,

    /// Interval between readiness probes
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Let the engine inherit stdout/stderr
    #[serde(default)]
    pub log: bool,

    /// Stop the engine when the owning process exits
    #[serde(default = "default_stop_at_exit")]
    pub stop_at_exit: bool,

    #[serde(default)]
    pub client: ClientConfig,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_startup_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_stop_at_exit() -> bool {
    true
}

impl SupervisorConfig {
    /// Defaults for everything except the executable path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            host: default_host(),
            port: default_port(),
            startup_timeout_ms: default_startup_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            log: false,
            stop_at_exit: default_stop_at_exit(),
            client: ClientConfig::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn with_stop_at_exit(mut self, stop_at_exit: bool) -> Self {
        self.stop_at_exit = stop_at_exit;
        self
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Base URL of the engine control API
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Load from a YAML file and validate
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: SupervisorConfig = serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::Config(
                "port must be non-zero; the engine port is fixed at construction".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.host.is_empty() {
            return Err(Error::Config("host must not be empty".to_string()));
        }
        Ok(())
    }
}
