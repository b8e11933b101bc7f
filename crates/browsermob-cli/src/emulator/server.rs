//! Emulator HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::router::route_request;
use super::state::{EmulatorState, DEFAULT_FIRST_PORT};

/// Startup behaviour of the emulator
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    pub addr: SocketAddr,
    /// Delay before the control port is bound
    pub listen_delay: Duration,
    /// Delay, from construction, before requests get anything but 503
    pub ready_delay: Duration,
    /// First port handed out by `POST /proxy`
    pub first_port: u16,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            listen_delay: Duration::ZERO,
            ready_delay: Duration::ZERO,
            first_port: DEFAULT_FIRST_PORT,
        }
    }
}

pub struct EmulatorServer {
    config: EmulatorConfig,
    state: Arc<EmulatorState>,
}

impl EmulatorServer {
    pub fn new(config: EmulatorConfig) -> Self {
        let state = Arc::new(EmulatorState::new(config.ready_delay, config.first_port));
        Self { config, state }
    }

    pub fn state(&self) -> Arc<EmulatorState> {
        Arc::clone(&self.state)
    }

    /// Wait out the listen delay, then serve forever
    pub async fn run(self) -> anyhow::Result<()> {
        if !self.config.listen_delay.is_zero() {
            debug!("Delaying listen by {:?}", self.config.listen_delay);
            tokio::time::sleep(self.config.listen_delay).await;
        }
        let listener = TcpListener::bind(self.config.addr).await?;
        info!(
            "BrowserMob emulator listening on http://{}",
            listener.local_addr()?
        );
        serve(listener, self.state).await
    }

    /// Bind now (ignoring the listen delay) and serve on a background task
    pub async fn spawn(self) -> anyhow::Result<EmulatorHandle> {
        let listener = TcpListener::bind(self.config.addr).await?;
        let addr = listener.local_addr()?;
        let state = Arc::clone(&self.state);
        let task = tokio::spawn(serve(listener, self.state));
        Ok(EmulatorHandle { addr, state, task })
    }
}

async fn serve(listener: TcpListener, state: Arc<EmulatorState>) -> anyhow::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let state = Arc::clone(&state);
                async move { route_request(req, state).await }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Emulator connection error: {}", e);
            }
        });
    }
}

/// A running in-process emulator. Stops serving when dropped.
pub struct EmulatorHandle {
    addr: SocketAddr,
    state: Arc<EmulatorState>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl EmulatorHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn state(&self) -> &EmulatorState {
        &self.state
    }
}

impl Drop for EmulatorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
