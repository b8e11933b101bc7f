//! `browsermob` command-line interface.

mod commands;

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

pub use commands::{exit_status, run};

#[derive(Parser, Debug)]
#[command(name = "browsermob")]
#[command(author, version, about = "Control a BrowserMob Proxy engine")]
pub struct Args {
    /// Engine control API URL
    #[arg(
        short,
        long,
        global = true,
        default_value = "http://localhost:8080",
        env = "BROWSERMOB_URL"
    )]
    pub url: String,

    /// Per-request timeout in milliseconds [default: 60000]
    #[arg(long, global = true)]
    pub request_timeout_ms: Option<u64>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Launch an engine, allocate an instance, and run until Ctrl-C
    Start(StartArgs),

    /// Allocate a proxy instance
    Create {
        /// Preferred instance port
        #[arg(long)]
        port: Option<u16>,
    },

    /// List allocated instance ports
    List,

    /// Print (or save) the current capture session
    Har {
        port: u16,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start a new capture session
    NewHar {
        port: u16,
        /// Name of the first page
        #[arg(long)]
        page_ref: Option<String>,
        #[command(flatten)]
        capture: CaptureFlags,
        /// Save the previous session here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start a new page in the current session
    Page { port: u16, page_ref: String },

    /// Shape bandwidth/latency: upstream_kbps=N downstream_kbps=N latency=MS
    Limit {
        port: u16,
        #[arg(required = true)]
        settings: Vec<String>,
    },

    /// Set timeouts in seconds: request=S read=S connection=S dns_cache=S
    Timeouts {
        port: u16,
        #[arg(required = true)]
        settings: Vec<String>,
    },

    /// Only allow URLs matching one of the patterns; others get STATUS
    Whitelist {
        port: u16,
        #[arg(short, long, default_value = "404")]
        status: u16,
        /// Remove the allow-list instead
        #[arg(long, conflicts_with = "patterns")]
        clear: bool,
        #[arg(required_unless_present = "clear")]
        patterns: Vec<String>,
    },

    /// Answer URLs matching the pattern with STATUS
    Blacklist {
        port: u16,
        #[arg(short, long, default_value = "404")]
        status: u16,
        /// Remove the deny-list instead
        #[arg(long, conflicts_with = "pattern")]
        clear: bool,
        #[arg(required_unless_present = "clear")]
        pattern: Option<String>,
    },

    /// Add DNS overrides: host=ip ...
    Hosts {
        port: u16,
        #[arg(required = true)]
        mappings: Vec<String>,
    },

    /// Add request headers: name=value ...
    Headers {
        port: u16,
        #[arg(required = true)]
        headers: Vec<String>,
    },

    /// Delete an instance
    Close { port: u16 },
}

#[derive(ClapArgs, Debug, Clone, Copy, Default)]
pub struct CaptureFlags {
    /// Record request and response headers
    #[arg(long)]
    pub capture_headers: bool,
    /// Record text bodies
    #[arg(long)]
    pub capture_content: bool,
    /// Record binary bodies too (implies --capture-content)
    #[arg(long)]
    pub capture_binary_content: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct StartArgs {
    /// Engine executable
    #[arg(long, env = "BROWSERMOB_PROXY_PATH")]
    pub path: Option<PathBuf>,

    /// YAML supervisor configuration; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Engine control port
    #[arg(long)]
    pub port: Option<u16>,

    /// Preferred port of the proxy instance
    #[arg(long)]
    pub proxy_port: Option<u16>,

    /// Let the engine write to this terminal
    #[arg(long)]
    pub log: bool,

    /// How long to wait for the engine, in milliseconds
    #[arg(long)]
    pub startup_timeout_ms: Option<u64>,

    /// Capture a HAR and write it here on exit
    #[arg(long)]
    pub har: Option<PathBuf>,

    /// Name of the first captured page
    #[arg(long, requires = "har")]
    pub page_ref: Option<String>,

    #[command(flatten)]
    pub capture: CaptureFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limit() {
        let args = Args::try_parse_from([
            "browsermob",
            "--url",
            "http://127.0.0.1:9000",
            "limit",
            "9091",
            "latency=100",
            "upstream_kbps=64",
        ])
        .unwrap();
        assert_eq!(args.url, "http://127.0.0.1:9000");
        match args.command {
            Command::Limit { port, settings } => {
                assert_eq!(port, 9091);
                assert_eq!(settings, vec!["latency=100", "upstream_kbps=64"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_limit_requires_settings() {
        assert!(Args::try_parse_from(["browsermob", "limit", "9091"]).is_err());
    }

    #[test]
    fn test_whitelist_clear() {
        let args = Args::try_parse_from(["browsermob", "whitelist", "9091", "--clear"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Whitelist { clear: true, .. }
        ));
        assert!(Args::try_parse_from(["browsermob", "whitelist", "9091"]).is_err());
    }

    #[test]
    fn test_start_flags() {
        let args = Args::try_parse_from([
            "browsermob",
            "start",
            "--path",
            "/opt/bmp/bin/browsermob-proxy",
            "--har",
            "out.har",
            "--capture-binary-content",
        ])
        .unwrap();
        let Command::Start(start) = args.command else {
            panic!("expected start");
        };
        assert_eq!(start.har, Some(PathBuf::from("out.har")));
        assert!(start.capture.capture_binary_content);
        assert!(!start.capture.capture_headers);
    }
}
