//! Allocation of proxy instances on a running engine.

use serde::Deserialize;
use tracing::info;

use crate::client::{self, Client};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::resource::Resource;

/// Body of `POST /proxy`
#[derive(Debug, Deserialize)]
struct Allocation {
    port: Option<u16>,
}

/// Body of `GET /proxy`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceList {
    #[serde(default)]
    proxy_list: Vec<Allocation>,
}

/// Creates [`Client`]s bound to fresh instances on one engine
#[derive(Debug, Clone)]
pub struct InstanceFactory {
    http: reqwest::Client,
    base_url: String,
    host: String,
}

impl InstanceFactory {
    pub fn new(base_url: &str, config: &ClientConfig) -> Result<Self> {
        Self::with_http_client(base_url, config.build_http_client()?)
    }

    pub fn with_http_client(base_url: &str, http: reqwest::Client) -> Result<Self> {
        let parsed = reqwest::Url::parse(base_url)
            .map_err(|e| Error::invalid(format!("invalid engine URL {base_url:?}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::invalid(format!("engine URL {base_url:?} has no host")))?
            .to_string();

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            host,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn allocation_url(&self) -> String {
        format!("{}/proxy", self.base_url)
    }

    /// Ask the engine for a new instance, on `port` if given
    pub async fn allocate(&self, port: Option<u16>) -> Result<Client> {
        let mut request = self.http.post(self.allocation_url());
        if let Some(port) = port {
            request = request.form(&[("port", port.to_string())]);
        }
        let body = client::send(&self.http, request).await?;

        let allocation: Allocation = serde_json::from_slice(&body).map_err(|e| {
            Error::protocol(format!(
                "cannot decode allocation response {:?}: {e}",
                String::from_utf8_lossy(&body)
            ))
        })?;
        let port = allocation
            .port
            .ok_or_else(|| Error::protocol("allocation response has no port"))?;

        info!("Allocated proxy instance on port {}", port);
        Ok(Client::new(
            self.http.clone(),
            Resource::for_instance(&self.base_url, port),
            self.host.clone(),
            port,
        ))
    }

    /// Ports of all instances currently allocated on the engine
    pub async fn list(&self) -> Result<Vec<u16>> {
        let body = client::send(&self.http, self.http.get(self.allocation_url())).await?;
        let list: InstanceList = serde_json::from_slice(&body)
            .map_err(|e| Error::protocol(format!("cannot decode instance list: {e}")))?;
        Ok(list.proxy_list.into_iter().filter_map(|a| a.port).collect())
    }

    /// Bind a client to an instance that already exists, without any request
    pub fn attach(&self, port: u16) -> Client {
        Client::new(
            self.http.clone(),
            Resource::for_instance(&self.base_url, port),
            self.host.clone(),
            port,
        )
    }
}
