//! browsermob - control a BrowserMob Proxy engine
//!
//! # Usage
//!
//! ```bash
//! # Launch an engine and capture a HAR until Ctrl-C
//! browsermob start --path ./bin/browsermob-proxy --har session.har --capture-headers
//!
//! # Talk to an engine that is already running
//! browsermob --url http://localhost:8080 create
//! browsermob limit 9091 downstream_kbps=512 latency=80
//! browsermob har 9091 -o session.har
//! ```
//!
//! Exits with status 2 when the input is rejected before the engine is
//! contacted (missing executable, invalid option), 1 on any other failure.

use std::process::ExitCode;

use browsermob_cli::cli::{self, Args};
use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    browsermob_cli::logging::init(args.verbose);

    match cli::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(cli::exit_status(&err))
        }
    }
}
