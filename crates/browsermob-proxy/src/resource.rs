//! Address composition for one proxy instance's REST namespace.
//!
//! A [`Resource`] is just a URL. Sub-resources are derived by appending path
//! segments; nothing here touches the network.

use std::fmt;

/// A REST resource rooted at `{engine}/proxy/{port}` (or any sub-path of it)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    url: String,
}

impl Resource {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
        }
    }

    /// The instance root for `port` on the engine at `engine_url`
    pub fn for_instance(engine_url: &str, port: u16) -> Self {
        Self::new(format!("{}/proxy/{}", engine_url.trim_end_matches('/'), port))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Child resource at `path`, relative to this one
    pub fn join(&self, path: &str) -> Resource {
        Resource {
            url: format!("{}/{}", self.url, path.trim_start_matches('/')),
        }
    }

    pub fn har(&self) -> Resource {
        self.join("har")
    }

    pub fn page_ref(&self) -> Resource {
        self.join("har/pageRef")
    }

    pub fn whitelist(&self) -> Resource {
        self.join("whitelist")
    }

    pub fn blacklist(&self) -> Resource {
        self.join("blacklist")
    }

    pub fn limit(&self) -> Resource {
        self.join("limit")
    }

    pub fn headers(&self) -> Resource {
        self.join("headers")
    }

    pub fn timeout(&self) -> Resource {
        self.join("timeout")
    }

    pub fn hosts(&self) -> Resource {
        self.join("hosts")
    }

    pub fn rewrite(&self) -> Resource {
        self.join("rewrite")
    }

    pub fn request_interceptor(&self) -> Resource {
        self.join("interceptor/request")
    }

    pub fn response_interceptor(&self) -> Resource {
        self.join("interceptor/response")
    }

    /// `auth/basic/{domain}`, with the domain percent-encoded as one segment
    pub fn basic_auth(&self, domain: &str) -> Resource {
        self.join(&format!("auth/basic/{}", urlencoding::encode(domain)))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_root() {
        let root = Resource::for_instance("http://localhost:8080/", 9091);
        assert_eq!(root.url(), "http://localhost:8080/proxy/9091");
    }

    #[test]
    fn test_sub_resources() {
        let root = Resource::for_instance("http://localhost:8080", 9091);
        let base = "http://localhost:8080/proxy/9091";
        let cases = [
            (root.har(), "har"),
            (root.page_ref(), "har/pageRef"),
            (root.whitelist(), "whitelist"),
            (root.blacklist(), "blacklist"),
            (root.limit(), "limit"),
            (root.headers(), "headers"),
            (root.timeout(), "timeout"),
            (root.hosts(), "hosts"),
            (root.rewrite(), "rewrite"),
            (root.request_interceptor(), "interceptor/request"),
            (root.response_interceptor(), "interceptor/response"),
            (root.basic_auth("example.com"), "auth/basic/example.com"),
        ];
        for (resource, path) in cases {
            assert_eq!(resource.url(), format!("{base}/{path}"));
        }
    }

    #[test]
    fn test_basic_auth_domain_is_one_segment() {
        let root = Resource::new("http://h:1/proxy/2");
        assert_eq!(
            root.basic_auth("evil.com/../x").url(),
            "http://h:1/proxy/2/auth/basic/evil.com%2F..%2Fx"
        );
    }
}
