//! In-memory engine state: allocated instances and their settings.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use browsermob_proxy::har::{Archive, Creator, Entry, Log, Page, PageTimings};
use browsermob_proxy::CaptureOptions;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Map;

pub const DEFAULT_FIRST_PORT: u16 = 9091;

const DEFAULT_PAGE_REF: &str = "Page 1";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
    #[error("port {0} is already in use")]
    PortInUse(u16),
    #[error("no free port left")]
    NoFreePort,
    #[error("no proxy instance on port {0}")]
    UnknownInstance(u16),
    #[error("no capture session on port {0}; call PUT har first")]
    NoSession(u16),
}

/// Allow-list / deny-list setting as received
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSetting {
    pub regex: String,
    pub status: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteSetting {
    pub match_regex: String,
    pub replace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// The open capture session of one instance
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub archive: Archive,
    pub capture: CaptureOptions,
}

impl Session {
    fn open(page_ref: &str, capture: CaptureOptions) -> Self {
        let archive = Archive {
            log: Log {
                version: "1.2".to_string(),
                creator: Creator {
                    name: "browsermob-emulator".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    comment: None,
                },
                browser: None,
                pages: vec![new_page(page_ref)],
                entries: Vec::new(),
                comment: None,
                extra: Map::new(),
            },
        };
        Self { archive, capture }
    }

    fn current_page(&self) -> Option<&str> {
        self.archive.log.pages.last().map(|p| p.id.as_str())
    }
}

fn new_page(id: &str) -> Page {
    Page {
        started_date_time: chrono::Utc::now().to_rfc3339(),
        id: id.to_string(),
        title: id.to_string(),
        page_timings: PageTimings::default(),
        comment: None,
        extra: Map::new(),
    }
}

/// Everything the control API can set on one instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Instance {
    pub session: Option<Session>,
    pub whitelist: Option<FilterSetting>,
    pub blacklist: Option<FilterSetting>,
    pub rewrite: Option<RewriteSetting>,
    pub headers: BTreeMap<String, String>,
    pub hosts: BTreeMap<String, String>,
    pub basic_auth: BTreeMap<String, Credentials>,
    /// Keyed by wire name (`upstreamKbps`, ...)
    pub limits: BTreeMap<String, u64>,
    /// Keyed by wire name (`requestTimeout`, ...), in milliseconds
    pub timeouts: BTreeMap<String, u64>,
    pub request_interceptor: Option<String>,
    pub response_interceptor: Option<String>,
}

impl Instance {
    /// Open a new session, returning the one it replaces
    pub fn new_har(&mut self, page_ref: Option<&str>, capture: CaptureOptions) -> Option<Archive> {
        let session = Session::open(page_ref.unwrap_or(DEFAULT_PAGE_REF), capture);
        self.session.replace(session).map(|s| s.archive)
    }

    pub fn new_page(&mut self, page_ref: &str) -> bool {
        match self.session.as_mut() {
            Some(session) => {
                session.archive.log.pages.push(new_page(page_ref));
                true
            }
            None => false,
        }
    }

    pub fn har(&self) -> Option<&Archive> {
        self.session.as_ref().map(|s| &s.archive)
    }
}

/// Shared state behind the emulator's HTTP surface
#[derive(Debug)]
pub struct EmulatorState {
    started: Instant,
    ready_delay: Duration,
    first_port: u16,
    instances: Mutex<BTreeMap<u16, Instance>>,
}

impl EmulatorState {
    pub fn new(ready_delay: Duration, first_port: u16) -> Self {
        Self {
            started: Instant::now(),
            ready_delay,
            first_port,
            instances: Mutex::new(BTreeMap::new()),
        }
    }

    /// The control API answers only after the configured ready delay
    pub fn is_ready(&self) -> bool {
        self.started.elapsed() >= self.ready_delay
    }

    pub fn allocate(&self, port: Option<u16>) -> Result<u16, StateError> {
        let mut instances = self.instances.lock();
        let port = match port {
            Some(port) if instances.contains_key(&port) => return Err(StateError::PortInUse(port)),
            Some(port) => port,
            None => (self.first_port..=u16::MAX)
                .find(|p| !instances.contains_key(p))
                .ok_or(StateError::NoFreePort)?,
        };
        instances.insert(port, Instance::default());
        Ok(port)
    }

    pub fn ports(&self) -> Vec<u16> {
        self.instances.lock().keys().copied().collect()
    }

    pub fn remove(&self, port: u16) -> Result<(), StateError> {
        self.instances
            .lock()
            .remove(&port)
            .map(|_| ())
            .ok_or(StateError::UnknownInstance(port))
    }

    /// Run `f` against the instance on `port`
    pub fn with_instance<R>(
        &self,
        port: u16,
        f: impl FnOnce(&mut Instance) -> R,
    ) -> Result<R, StateError> {
        let mut instances = self.instances.lock();
        let instance = instances
            .get_mut(&port)
            .ok_or(StateError::UnknownInstance(port))?;
        Ok(f(instance))
    }

    /// Snapshot of one instance
    pub fn instance(&self, port: u16) -> Option<Instance> {
        self.instances.lock().get(&port).cloned()
    }

    /// Append an entry to the open session, attributed to its current page.
    /// Stands in for traffic the real engine would have captured.
    pub fn record(&self, port: u16, mut entry: Entry) -> Result<(), StateError> {
        self.with_instance(port, |instance| {
            let session = instance
                .session
                .as_mut()
                .ok_or(StateError::NoSession(port))?;
            if entry.pageref.is_none() {
                entry.pageref = session.current_page().map(String::from);
            }
            session.archive.log.entries.push(entry);
            Ok(())
        })?
    }
}
