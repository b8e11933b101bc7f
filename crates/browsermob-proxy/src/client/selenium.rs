//! WebDriver proxy capability for pointing a browser at an instance.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};

/// Protocols a browser can be told to send through the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyProtocol {
    Http,
    Ssl,
    Ftp,
}

impl ProxyProtocol {
    pub const ALL: [ProxyProtocol; 3] = [ProxyProtocol::Http, ProxyProtocol::Ssl, ProxyProtocol::Ftp];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Ssl => "ssl",
            ProxyProtocol::Ftp => "ftp",
        }
    }
}

impl fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim_start_matches(':').to_ascii_lowercase().as_str() {
            "http" => Ok(ProxyProtocol::Http),
            "ssl" => Ok(ProxyProtocol::Ssl),
            "ftp" => Ok(ProxyProtocol::Ftp),
            _ => Err(Error::invalid(format!(
                "invalid protocol specified: {s:?}; must be one of: http, ssl, or ftp"
            ))),
        }
    }
}

/// Manual proxy settings in W3C WebDriver capability form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeleniumProxy {
    pub proxy_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_proxy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ftp_proxy: Option<String>,
}

impl SeleniumProxy {
    /// Route each of `protocols` (HTTP only if empty) to `host:port`
    pub fn new(host: &str, port: u16, protocols: &[ProxyProtocol]) -> Self {
        let address = format!("{host}:{port}");
        let protocols = if protocols.is_empty() {
            &[ProxyProtocol::Http][..]
        } else {
            protocols
        };

        let mut proxy = SeleniumProxy {
            proxy_type: "manual",
            ..Default::default()
        };
        for protocol in protocols {
            let slot = match protocol {
                ProxyProtocol::Http => &mut proxy.http_proxy,
                ProxyProtocol::Ssl => &mut proxy.ssl_proxy,
                ProxyProtocol::Ftp => &mut proxy.ftp_proxy,
            };
            *slot = Some(address.clone());
        }
        proxy
    }

    /// Like [`SeleniumProxy::new`], parsing protocol names first
    pub fn from_names<S: AsRef<str>>(host: &str, port: u16, names: &[S]) -> Result<Self> {
        let protocols = names
            .iter()
            .map(|n| n.as_ref().parse())
            .collect::<Result<Vec<ProxyProtocol>>>()?;
        Ok(Self::new(host, port, &protocols))
    }

    pub fn address(&self, protocol: ProxyProtocol) -> Option<&str> {
        match protocol {
            ProxyProtocol::Http => self.http_proxy.as_deref(),
            ProxyProtocol::Ssl => self.ssl_proxy.as_deref(),
            ProxyProtocol::Ftp => self.ftp_proxy.as_deref(),
        }
    }

    /// JSON value for the `proxy` capability
    pub fn to_capability(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_http_only() {
        let proxy = SeleniumProxy::new("localhost", 9091, &[]);
        assert_eq!(proxy.http_proxy.as_deref(), Some("localhost:9091"));
        assert!(proxy.ssl_proxy.is_none());
        assert!(proxy.ftp_proxy.is_none());
    }

    #[test]
    fn test_multiple_protocols() {
        let proxy = SeleniumProxy::new("localhost", 9091, &[ProxyProtocol::Http, ProxyProtocol::Ssl]);
        assert_eq!(proxy.address(ProxyProtocol::Http), Some("localhost:9091"));
        assert_eq!(proxy.address(ProxyProtocol::Ssl), Some("localhost:9091"));
        assert_eq!(proxy.address(ProxyProtocol::Ftp), None);
    }

    #[test]
    fn test_disable_http() {
        let proxy = SeleniumProxy::from_names("localhost", 9091, &["ssl"]).unwrap();
        assert_eq!(proxy.ssl_proxy.as_deref(), Some("localhost:9091"));
        assert!(proxy.http_proxy.is_none());
    }

    #[test]
    fn test_bad_protocol_name() {
        let err = SeleniumProxy::from_names("localhost", 9091, &["htp"]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(":ftp".parse::<ProxyProtocol>().is_ok());
    }

    #[test]
    fn test_capability_json() {
        let proxy = SeleniumProxy::new("10.0.0.5", 8081, &ProxyProtocol::ALL);
        assert_eq!(
            proxy.to_capability(),
            serde_json::json!({
                "proxyType": "manual",
                "httpProxy": "10.0.0.5:8081",
                "sslProxy": "10.0.0.5:8081",
                "ftpProxy": "10.0.0.5:8081"
            })
        );
    }
}
