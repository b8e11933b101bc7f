//! Readiness probes for a freshly spawned engine.
//!
//! Ready means two things at once: the control port accepts TCP connections
//! ("listening") and the allocation endpoint answers without error
//! ("initialized"). They are checked separately so a slow start can be
//! attributed to one layer or the other.

use std::fmt;
use std::time::Duration;

use tokio::net::TcpStream;

use crate::error::Result;

const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Outcome of one probe tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub listening: bool,
    pub initialized: bool,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.listening && self.initialized
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        write!(
            f,
            "listening: {}, initialized: {}",
            yes_no(self.listening),
            yes_no(self.initialized)
        )
    }
}

pub struct ReadinessProbe {
    http: reqwest::Client,
    host: String,
    port: u16,
    probe_url: String,
}

impl ReadinessProbe {
    pub fn new(host: &str, port: u16, base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
        Ok(Self {
            http,
            host: host.to_string(),
            port,
            probe_url: format!("{}/proxy", base_url.trim_end_matches('/')),
        })
    }

    /// The control port accepts a raw TCP connection
    pub async fn is_listening(&self) -> bool {
        matches!(
            tokio::time::timeout(
                PROBE_TIMEOUT,
                TcpStream::connect((self.host.as_str(), self.port))
            )
            .await,
            Ok(Ok(_))
        )
    }

    /// `GET /proxy` succeeds
    pub async fn is_initialized(&self) -> bool {
        match self.http.get(&self.probe_url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    pub async fn check(&self) -> Readiness {
        let listening = self.is_listening().await;
        let initialized = listening && self.is_initialized().await;
        Readiness {
            listening,
            initialized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_requires_both() {
        assert!(!Readiness::default().is_ready());
        assert!(!Readiness {
            listening: true,
            initialized: false
        }
        .is_ready());
        assert!(Readiness {
            listening: true,
            initialized: true
        }
        .is_ready());
    }

    #[tokio::test]
    async fn test_listening_without_http_is_not_initialized() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // accept and immediately drop connections: TCP works, HTTP does not
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        let probe = ReadinessProbe::new("127.0.0.1", port, &format!("http://127.0.0.1:{port}")).unwrap();
        let readiness = probe.check().await;
        assert!(readiness.listening);
        assert!(!readiness.initialized);
    }

    #[tokio::test]
    async fn test_closed_port() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let probe = ReadinessProbe::new("127.0.0.1", port, &format!("http://127.0.0.1:{port}")).unwrap();
        assert_eq!(probe.check().await, Readiness::default());
    }
}
