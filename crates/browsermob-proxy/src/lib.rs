//! Client and process supervisor for the BrowserMob Proxy engine.
//!
//! ```no_run
//! use browsermob_proxy::{CaptureOptions, Supervisor, SupervisorConfig};
//!
//! # async fn run() -> browsermob_proxy::Result<()> {
//! let mut engine = Supervisor::new(SupervisorConfig::new("/opt/browsermob/bin/browsermob-proxy"))?;
//! engine.start().await?;
//!
//! let proxy = engine.create_proxy(None).await?;
//! proxy.new_har(Some("home"), CaptureOptions::headers()).await?;
//! // ... drive a browser through proxy.selenium_proxy(&[]) ...
//! let har = proxy.har().await?;
//!
//! proxy.close().await?;
//! engine.stop().await?;
//! # Ok(())
//! # }
//! ```

// ===== Engine control =====
pub mod client;
pub mod factory;
pub mod resource;
pub mod supervisor;

// ===== Capture =====
pub mod har;
pub mod listener;

pub mod config;
pub mod error;

pub use client::{CaptureOptions, Client, FilterRule, Limits, ProxyProtocol, SeleniumProxy, Timeouts};
pub use config::{ClientConfig, SupervisorConfig};
pub use error::{Error, Result};
pub use factory::InstanceFactory;
pub use har::Archive;
pub use listener::{CaptureControl, NavigationListener};
pub use resource::Resource;
pub use supervisor::{EngineState, Readiness, SignalDeferral, Supervisor};
