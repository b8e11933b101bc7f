//! Lifecycle of a local engine process.
//!
//! `start` spawns the engine executable with `--port N`, then polls until the
//! control port both accepts connections and answers `GET /proxy`. The engine
//! is spawned as the leader of its own process group so that `stop` also
//! reaches the JVM started by the launcher script.

mod exit_guard;
mod readiness;

pub use exit_guard::{ExitGuard, ExitGuardRegistry, OwnerToken, SignalDeferral, EXIT_GRACE};
pub use readiness::{Readiness, ReadinessProbe};

use std::fs;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::config::SupervisorConfig;
use crate::error::{Error, Result};
use crate::factory::InstanceFactory;

/// Time between SIGTERM and SIGKILL in [`Supervisor::stop`]
const STOP_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unstarted,
    Starting,
    Ready,
    Stopped,
    Failed,
}

/// Owns one engine process
#[derive(Debug)]
pub struct Supervisor {
    config: SupervisorConfig,
    registry: Arc<ExitGuardRegistry>,
    child: Option<Child>,
    guard: Option<ExitGuard>,
    state: EngineState,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Result<Self> {
        Self::with_registry(config, ExitGuardRegistry::global())
    }

    /// Use a private exit-guard registry instead of the process-wide one
    pub fn with_registry(config: SupervisorConfig, registry: Arc<ExitGuardRegistry>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry,
            child: None,
            guard: None,
            state: EngineState::Unstarted,
        })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Control API base URL, e.g. `http://localhost:8080`
    pub fn url(&self) -> String {
        self.config.url()
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    pub fn is_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Spawn the engine and wait until it is ready.
    ///
    /// Calling `start` on a running engine is a no-op. On failure the spawned
    /// process is stopped before the error is returned.
    pub async fn start(&mut self) -> Result<()> {
        if self.state == EngineState::Ready && self.is_alive() {
            return Ok(());
        }
        if self.child.is_some() {
            self.stop().await?;
        }

        assert_executable(&self.config.path)?;
        self.state = EngineState::Starting;

        let mut command = Command::new(&self.config.path);
        command
            .arg("--port")
            .arg(self.config.port.to_string())
            .stdin(Stdio::null());
        if self.config.log {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|source| {
            self.state = EngineState::Failed;
            Error::Spawn {
                path: self.config.path.clone(),
                source,
            }
        })?;
        let pid = child.id();
        info!(
            "Spawned engine {} (pid {:?}) on port {}",
            self.config.path.display(),
            pid,
            self.config.port
        );
        self.child = Some(child);
        if self.config.stop_at_exit {
            self.guard = pid.map(|pid| self.registry.register(pid));
        }

        match self.wait_for_startup().await {
            Ok(()) => {
                self.state = EngineState::Ready;
                Ok(())
            }
            Err(e) => {
                warn!("Engine failed to start: {}", e);
                if let Some(guard) = self.guard.take() {
                    guard.disarm();
                }
                if let Some(mut child) = self.child.take() {
                    if let Err(stop_err) = terminate(&mut child, STOP_GRACE).await {
                        warn!("Failed to stop engine after failed start: {}", stop_err);
                    }
                }
                self.state = EngineState::Failed;
                Err(e)
            }
        }
    }

    async fn wait_for_startup(&mut self) -> Result<()> {
        let probe = ReadinessProbe::new(&self.config.host, self.config.port, &self.url())?;
        let timeout = self.config.startup_timeout();
        let interval = self.config.poll_interval();
        let Some(child) = self.child.as_mut() else {
            return Err(Error::invalid("engine was not spawned"));
        };

        let started = Instant::now();
        let deadline = started + timeout;
        let mut last = Readiness::default();

        loop {
            if let Some(status) = child.try_wait()? {
                return Err(Error::ProcessDied { status });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Ok(readiness) = tokio::time::timeout(remaining, probe.check()).await {
                last = readiness;
                debug!("Engine readiness after {:?}: {}", started.elapsed(), last);
                if last.is_ready() {
                    info!("Engine ready after {:?}", started.elapsed());
                    return Ok(());
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::StartupTimeout {
                    waited: started.elapsed(),
                    last,
                });
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
        }
    }

    /// Stop the engine. Safe to call repeatedly, and before `start`.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(guard) = self.guard.take() {
            guard.disarm();
        }
        let Some(mut child) = self.child.take() else {
            if self.state != EngineState::Unstarted {
                self.state = EngineState::Stopped;
            }
            return Ok(());
        };

        let status = terminate(&mut child, STOP_GRACE).await?;
        info!("Engine stopped ({})", status);
        self.state = EngineState::Stopped;
        Ok(())
    }

    /// Allocate a proxy instance on this engine, on `port` if given
    pub async fn create_proxy(&self, port: Option<u16>) -> Result<Client> {
        InstanceFactory::new(&self.url(), &self.config.client)?
            .allocate(port)
            .await
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            guard.fire();
        }
    }
}

fn assert_executable(path: &Path) -> Result<()> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    if !metadata.is_file() {
        return Err(Error::PermissionDenied(path.to_path_buf()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(Error::PermissionDenied(path.to_path_buf()));
        }
    }
    Ok(())
}

/// SIGTERM the process group, escalating to SIGKILL after `grace`
async fn terminate(child: &mut Child, grace: Duration) -> Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }
    if let Some(pid) = child.id() {
        exit_guard::signal_terminate(pid);
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => return Ok(status?),
            Err(_) => {
                warn!("Engine did not exit within {:?}, killing", grace);
                exit_guard::signal_kill(pid);
            }
        }
    }
    child.kill().await.ok();
    Ok(child.wait().await?)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn supervisor(path: PathBuf, registry: &Arc<ExitGuardRegistry>) -> Supervisor {
        let config = SupervisorConfig::new(path)
            .with_port(free_port())
            .with_startup_timeout(Duration::from_millis(500))
            .with_poll_interval(Duration::from_millis(50));
        Supervisor::with_registry(config, Arc::clone(registry)).unwrap()
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let registry = ExitGuardRegistry::new();
        let mut sup = supervisor(PathBuf::from("/definitely/not/here/browsermob-proxy"), &registry);
        let err = sup.start().await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(sup.state(), EngineState::Unstarted);
    }

    #[tokio::test]
    async fn test_not_executable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("browsermob-proxy");
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let registry = ExitGuardRegistry::new();
        let mut sup = supervisor(path, &registry);
        assert!(matches!(
            sup.start().await.unwrap_err(),
            Error::PermissionDenied(_)
        ));
    }

    #[tokio::test]
    async fn test_engine_that_exits_early() {
        let dir = TempDir::new().unwrap();
        let registry = ExitGuardRegistry::new();
        let mut sup = supervisor(script(&dir, "engine", "exit 3"), &registry);

        match sup.start().await.unwrap_err() {
            Error::ProcessDied { status } => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(sup.state(), EngineState::Failed);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_startup_timeout_stops_engine() {
        let dir = TempDir::new().unwrap();
        let registry = ExitGuardRegistry::new();
        let mut sup = supervisor(script(&dir, "engine", "exec sleep 30"), &registry);

        let started = Instant::now();
        let err = sup.start().await.unwrap_err();
        let elapsed = started.elapsed();

        match err {
            Error::StartupTimeout { last, .. } => assert!(!last.listening),
            other => panic!("unexpected error: {other}"),
        }
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_secs(5));
        assert_eq!(sup.state(), EngineState::Failed);
        assert!(!sup.is_alive());
        assert!(sup.pid().is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let registry = ExitGuardRegistry::new();
        let mut sup = supervisor(PathBuf::from("/unused"), &registry);
        sup.stop().await.unwrap();
        assert_eq!(sup.state(), EngineState::Unstarted);
        sup.stop().await.unwrap();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SupervisorConfig::new("/unused").with_port(0);
        assert!(matches!(
            Supervisor::with_registry(config, ExitGuardRegistry::new()),
            Err(Error::Config(_))
        ));
    }
}
