use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use browsermob_proxy::har::Archive;
use browsermob_proxy::{
    CaptureOptions, Client, ClientConfig, InstanceFactory, Limits, ProxyProtocol, SignalDeferral,
    Supervisor, SupervisorConfig, Timeouts,
};
use tracing::{info, warn};

use super::{Args, CaptureFlags, Command, StartArgs};
use crate::shutdown::shutdown_signal;

impl From<CaptureFlags> for CaptureOptions {
    fn from(flags: CaptureFlags) -> Self {
        CaptureOptions {
            capture_headers: flags.capture_headers,
            capture_content: flags.capture_content,
            capture_binary_content: flags.capture_binary_content,
        }
    }
}

/// Process exit status for a failed command: 2 when the engine was never
/// contacted because the input was unusable, 1 otherwise
pub fn exit_status(err: &anyhow::Error) -> u8 {
    let usage = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<browsermob_proxy::Error>())
        .any(browsermob_proxy::Error::is_usage_error);
    if usage {
        2
    } else {
        1
    }
}

/// Execute a parsed command line
pub async fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Start(start) => run_start(start, args.request_timeout_ms).await,
        command => {
            let mut client_config = ClientConfig::default();
            if let Some(ms) = args.request_timeout_ms {
                client_config.request_timeout_ms = ms;
            }
            let factory = InstanceFactory::new(&args.url, &client_config)
                .with_context(|| format!("cannot use engine URL {}", args.url))?;
            run_instance_command(command, &factory).await
        }
    }
}

async fn run_instance_command(command: Command, factory: &InstanceFactory) -> Result<()> {
    match command {
        Command::Start(_) => unreachable!("start is handled by run"),
        Command::Create { port } => {
            let client = factory.allocate(port).await?;
            println!("{}", client.port());
        }
        Command::List => {
            for port in factory.list().await? {
                println!("{port}");
            }
        }
        Command::Har { port, output } => match factory.attach(port).har().await? {
            Some(har) => write_har(&har, output.as_deref())?,
            None => warn!("No capture session on port {}", port),
        },
        Command::NewHar {
            port,
            page_ref,
            capture,
            output,
        } => {
            let previous = factory
                .attach(port)
                .new_har(page_ref.as_deref(), capture.into())
                .await?;
            match (previous, output) {
                (Some(har), Some(path)) => write_har(&har, Some(path.as_path()))?,
                (Some(har), None) => info!(
                    "Closed previous session ({} entries)",
                    har.entries().len()
                ),
                (None, _) => {}
            }
        }
        Command::Page { port, page_ref } => factory.attach(port).new_page(&page_ref).await?,
        Command::Limit { port, settings } => {
            let pairs = parse_pairs(&settings)?;
            let limits =
                Limits::from_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
            factory.attach(port).limit(&limits).await?;
        }
        Command::Timeouts { port, settings } => {
            let pairs = parse_pairs(&settings)?;
            let timeouts =
                Timeouts::from_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
            factory.attach(port).timeouts(&timeouts).await?;
        }
        Command::Whitelist {
            port,
            status,
            clear,
            patterns,
        } => {
            let client = factory.attach(port);
            if clear {
                client.clear_whitelist().await?;
            } else {
                client.whitelist(&patterns, status).await?;
            }
        }
        Command::Blacklist {
            port,
            status,
            clear,
            pattern,
        } => {
            let client = factory.attach(port);
            match (clear, pattern) {
                (true, _) => client.clear_blacklist().await?,
                (false, Some(pattern)) => client.blacklist(pattern, status).await?,
                (false, None) => bail!("a pattern is required unless --clear is given"),
            }
        }
        Command::Hosts { port, mappings } => {
            let hosts: HashMap<String, String> = parse_pairs(&mappings)?.into_iter().collect();
            factory.attach(port).remap_dns_hosts(&hosts).await?;
        }
        Command::Headers { port, headers } => {
            let headers: HashMap<String, String> = parse_pairs(&headers)?.into_iter().collect();
            factory.attach(port).headers(&headers).await?;
        }
        Command::Close { port } => factory.attach(port).close().await?,
    }
    Ok(())
}

/// Supervisor settings from `--config` (if any) with command-line flags on top
fn supervisor_config(
    start: &StartArgs,
    request_timeout_ms: Option<u64>,
) -> Result<SupervisorConfig> {
    let mut config = match &start.config {
        Some(file) => SupervisorConfig::from_file(file)
            .with_context(|| format!("failed to load {}", file.display()))?,
        None => {
            let path = start
                .path
                .clone()
                .context("no engine executable: pass --path or set BROWSERMOB_PROXY_PATH")?;
            SupervisorConfig::new(path)
        }
    };
    if let Some(path) = &start.path {
        config.path = path.clone();
    }
    if let Some(port) = start.port {
        config.port = port;
    }
    if let Some(ms) = start.startup_timeout_ms {
        config.startup_timeout_ms = ms;
    }
    if let Some(ms) = request_timeout_ms {
        config.client.request_timeout_ms = ms;
    }
    config.log |= start.log;
    Ok(config)
}

async fn run_start(start: StartArgs, request_timeout_ms: Option<u64>) -> Result<()> {
    let config = supervisor_config(&start, request_timeout_ms)?;
    let mut engine = Supervisor::new(config)?;
    engine.start().await.context("failed to start engine")?;

    let result = serve_until_interrupted(&engine, &start).await;
    engine.stop().await.context("failed to stop engine")?;
    result
}

async fn serve_until_interrupted(engine: &Supervisor, start: &StartArgs) -> Result<()> {
    let proxy = engine
        .create_proxy(start.proxy_port)
        .await
        .context("failed to allocate a proxy instance")?;
    announce(engine, &proxy)?;

    if start.har.is_some() {
        proxy
            .new_har(start.page_ref.as_deref(), start.capture.into())
            .await?;
    }

    // from here on, a signal saves the capture before the engine is stopped
    let _deferral = SignalDeferral::new();
    info!("Press Ctrl-C to stop");
    shutdown_signal().await;

    if let Some(path) = &start.har {
        match proxy.har().await? {
            Some(har) => {
                har.save(path)?;
                info!(
                    "Saved {} entries to {}",
                    har.entries().len(),
                    path.display()
                );
            }
            None => warn!("No capture session to save"),
        }
    }
    proxy.close().await?;
    Ok(())
}

fn announce(engine: &Supervisor, proxy: &Client) -> Result<()> {
    println!("engine: {}", engine.url());
    println!("proxy:  {}:{}", proxy.host(), proxy.port());
    let capability = proxy
        .selenium_proxy(&[ProxyProtocol::Http, ProxyProtocol::Ssl])
        .to_capability();
    println!("webdriver proxy capability: {}", serde_json::to_string(&capability)?);
    Ok(())
}

fn write_har(har: &Archive, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            har.save(path)?;
            info!("Wrote {} entries to {}", har.entries().len(), path.display());
        }
        None => println!("{}", har.to_string_pretty()?),
    }
    Ok(())
}

/// Split `key=value` arguments
pub(crate) fn parse_pairs(items: &[String]) -> Result<Vec<(String, String)>> {
    items
        .iter()
        .map(|item| {
            item.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .filter(|(k, _)| !k.is_empty())
                .with_context(|| format!("expected key=value, got {item:?}"))
        })
        .collect()
}
