//! BrowserMob engine emulator
//!
//! Serves the engine's REST control API from memory. Launched the same way as
//! the real engine, so it can stand in for it under a supervisor:
//!
//! ```bash
//! browsermob-emulator --port 8080
//!
//! # A slow engine: bind after 1s, answer after 1.2s
//! browsermob-emulator --port 8080 --listen-delay-ms 1000 --ready-delay-ms 1200
//! ```

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use browsermob_cli::emulator::{EmulatorConfig, EmulatorServer, DEFAULT_FIRST_PORT};
use browsermob_cli::shutdown::shutdown_signal;
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "browsermob-emulator")]
#[command(author, version, about = "In-memory BrowserMob Proxy engine emulator")]
struct Args {
    /// Control API port
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Delay before the control port is bound, in milliseconds
    #[arg(long, default_value = "0", env = "BROWSERMOB_EMULATOR_LISTEN_DELAY_MS")]
    listen_delay_ms: u64,

    /// Delay before the control API answers, in milliseconds from launch
    #[arg(long, default_value = "0", env = "BROWSERMOB_EMULATOR_READY_DELAY_MS")]
    ready_delay_ms: u64,

    /// First port handed out to new proxy instances
    #[arg(long, default_value_t = DEFAULT_FIRST_PORT)]
    first_port: u16,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    browsermob_cli::logging::init(args.verbose);

    let config = EmulatorConfig {
        addr: SocketAddr::new(args.bind, args.port),
        listen_delay: Duration::from_millis(args.listen_delay_ms),
        ready_delay: Duration::from_millis(args.ready_delay_ms),
        first_port: args.first_port,
    };
    let server = EmulatorServer::new(config);

    tokio::select! {
        result = server.run() => result,
        _ = shutdown_signal() => {
            info!("Emulator shutting down");
            Ok(())
        }
    }
}
