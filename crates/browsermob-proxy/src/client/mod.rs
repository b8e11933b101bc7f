//! Control client for one proxy instance.
//!
//! Every method is a single request against the instance's REST namespace.
//! Nothing is cached client-side apart from the host/port binding.
//!
//! Replace-vs-merge is decided by the engine and differs per operation:
//! `whitelist`, `blacklist` and `rewrite` replace the current rule, while
//! `remap_dns_hosts` merges into the existing table.

mod options;
mod selenium;

pub use options::{
    new_har_params, seconds_to_millis, CaptureOptions, FilterRule, Limits, Params, Pattern,
    Timeouts,
};
pub use selenium::{ProxyProtocol, SeleniumProxy};

use std::collections::HashMap;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::RequestBuilder;
use serde::Serialize;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::factory::InstanceFactory;
use crate::har::{self, Archive};
use crate::resource::Resource;

/// Client bound to a single proxy instance
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    resource: Resource,
    host: String,
    port: u16,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

impl Client {
    pub fn new(http: reqwest::Client, resource: Resource, host: impl Into<String>, port: u16) -> Self {
        Self {
            http,
            resource,
            host: host.into(),
            port,
        }
    }

    /// Allocate a new instance on the engine at `server_url`
    pub async fn from_url(server_url: &str, port: Option<u16>) -> Result<Self> {
        InstanceFactory::new(server_url, &ClientConfig::default())?
            .allocate(port)
            .await
    }

    /// Host the instance listens on, as seen by the caller
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port of the instance (the proxy port browsers connect to)
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Start a new capture session, returning the previous one if there was any.
    pub async fn new_har(
        &self,
        page_ref: Option<&str>,
        options: CaptureOptions,
    ) -> Result<Option<Archive>> {
        let params = new_har_params(page_ref, options);
        let body = self
            .send(self.http.put(self.resource.har().url()).form(&params))
            .await?;
        har::decode_body(&body)
    }

    /// Start a new page within the current session
    pub async fn new_page(&self, page_ref: &str) -> Result<()> {
        let params = [("pageRef", page_ref)];
        self.send(self.http.put(self.resource.page_ref().url()).form(&params))
            .await?;
        Ok(())
    }

    /// The current capture session, or `None` if the engine has none
    pub async fn har(&self) -> Result<Option<Archive>> {
        let body = self.send(self.http.get(self.resource.har().url())).await?;
        har::decode_body(&body)
    }

    /// Replace the allow-list: URLs matching none of `patterns` get `status`
    pub async fn whitelist<I, P>(&self, patterns: I, status: u16) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: Into<Pattern>,
    {
        let rule = FilterRule::new(patterns, status)?;
        self.put_params(&self.resource.whitelist(), &rule.to_params())
            .await
    }

    /// Replace the deny-list: URLs matching `pattern` get `status`
    pub async fn blacklist(&self, pattern: impl Into<Pattern>, status: u16) -> Result<()> {
        let rule = FilterRule::new([pattern], status)?;
        self.put_params(&self.resource.blacklist(), &rule.to_params())
            .await
    }

    pub async fn clear_whitelist(&self) -> Result<()> {
        self.delete(&self.resource.whitelist()).await
    }

    pub async fn clear_blacklist(&self) -> Result<()> {
        self.delete(&self.resource.blacklist()).await
    }

    /// Replace the rewrite rule
    pub async fn rewrite(&self, pattern: impl Into<Pattern>, replacement: &str) -> Result<()> {
        let pattern = pattern.into();
        let params: Params = vec![
            ("matchRegex", pattern.as_str().to_string()),
            ("replace", replacement.to_string()),
        ];
        self.put_params(&self.resource.rewrite(), &params).await
    }

    pub async fn clear_rewrites(&self) -> Result<()> {
        self.delete(&self.resource.rewrite()).await
    }

    /// Headers added to every request passing through the instance
    pub async fn headers(&self, headers: &HashMap<String, String>) -> Result<()> {
        self.post_json(&self.resource.headers(), headers).await
    }

    /// Inject basic-auth credentials for requests to `domain`
    pub async fn basic_authentication(
        &self,
        domain: &str,
        username: &str,
        password: &str,
    ) -> Result<()> {
        let credentials = Credentials { username, password };
        self.post_json(&self.resource.basic_auth(domain), &credentials)
            .await
    }

    pub async fn timeouts(&self, timeouts: &Timeouts) -> Result<()> {
        let params = timeouts.to_params()?;
        self.put_params(&self.resource.timeout(), &params).await
    }

    /// Merge `hosts` (hostname → IP) into the engine's DNS overrides
    pub async fn remap_dns_hosts(&self, hosts: &HashMap<String, String>) -> Result<()> {
        self.post_json(&self.resource.hosts(), hosts).await
    }

    pub async fn limit(&self, limits: &Limits) -> Result<()> {
        let params = limits.to_params()?;
        self.put_params(&self.resource.limit(), &params).await
    }

    /// Script run by the engine before each request is sent upstream
    pub async fn set_request_interceptor(&self, script: &str) -> Result<()> {
        self.post_text(&self.resource.request_interceptor(), script)
            .await
    }

    /// Script run by the engine on each response before it is returned
    pub async fn set_response_interceptor(&self, script: &str) -> Result<()> {
        self.post_text(&self.resource.response_interceptor(), script)
            .await
    }

    /// Delete the instance
    pub async fn close(self) -> Result<()> {
        self.delete(&self.resource).await
    }

    pub fn selenium_proxy(&self, protocols: &[ProxyProtocol]) -> SeleniumProxy {
        SeleniumProxy::new(&self.host, self.port, protocols)
    }

    async fn put_params(&self, resource: &Resource, params: &Params) -> Result<()> {
        self.send(self.http.put(resource.url()).form(params)).await?;
        Ok(())
    }

    async fn post_json<T: Serialize + ?Sized>(&self, resource: &Resource, body: &T) -> Result<()> {
        self.send(self.http.post(resource.url()).json(body)).await?;
        Ok(())
    }

    async fn post_text(&self, resource: &Resource, text: &str) -> Result<()> {
        self.send(
            self.http
                .post(resource.url())
                .header(CONTENT_TYPE, "text/plain")
                .body(text.to_string()),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, resource: &Resource) -> Result<()> {
        self.send(self.http.delete(resource.url())).await?;
        Ok(())
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Bytes> {
        send(&self.http, builder).await
    }
}

/// Execute a request, turning non-2xx statuses into [`Error::Engine`]
pub(crate) async fn send(http: &reqwest::Client, builder: RequestBuilder) -> Result<Bytes> {
    let request = builder.build()?;
    let method = request.method().to_string();
    let url = request.url().to_string();
    debug!("{} {}", method, url);

    let resp = http.execute(request).await?;
    let status = resp.status();
    let body = resp.bytes().await?;

    if !status.is_success() {
        return Err(Error::Engine {
            method,
            url,
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }
    Ok(body)
}
