//! Typed option values and their wire (form parameter) encodings.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Form parameters for one PUT, in insertion order
pub type Params = Vec<(&'static str, String)>;

/// What a new capture session records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    pub capture_headers: bool,
    pub capture_content: bool,
    /// Implies `capture_content`
    pub capture_binary_content: bool,
}

impl CaptureOptions {
    pub fn headers() -> Self {
        Self {
            capture_headers: true,
            ..Self::default()
        }
    }

    pub fn content() -> Self {
        Self {
            capture_content: true,
            ..Self::default()
        }
    }

    pub fn binary_content() -> Self {
        Self {
            capture_binary_content: true,
            ..Self::default()
        }
    }

    pub fn with_headers(mut self) -> Self {
        self.capture_headers = true;
        self
    }

    pub fn with_content(mut self) -> Self {
        self.capture_content = true;
        self
    }

    pub fn with_binary_content(mut self) -> Self {
        self.capture_binary_content = true;
        self
    }
}

/// Parameters for `PUT har`. Only supplied flags appear.
pub fn new_har_params(page_ref: Option<&str>, options: CaptureOptions) -> Params {
    let mut params = Params::new();
    if let Some(page_ref) = page_ref {
        params.push(("initialPageRef", page_ref.to_string()));
    }
    if options.capture_headers {
        params.push(("captureHeaders", "true".to_string()));
    }
    if options.capture_content || options.capture_binary_content {
        params.push(("captureContent", "true".to_string()));
    }
    if options.capture_binary_content {
        params.push(("captureBinaryContent", "true".to_string()));
    }
    params
}

/// Bandwidth and latency shaping. Unset fields keep the engine's current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
    pub upstream_kbps: Option<u64>,
    pub downstream_kbps: Option<u64>,
    /// Added latency in milliseconds
    pub latency: Option<u64>,
}

impl Limits {
    pub const KEYS: [&'static str; 3] = ["upstream_kbps", "downstream_kbps", "latency"];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn upstream_kbps(mut self, kbps: u64) -> Self {
        self.upstream_kbps = Some(kbps);
        self
    }

    pub fn downstream_kbps(mut self, kbps: u64) -> Self {
        self.downstream_kbps = Some(kbps);
        self
    }

    pub fn latency(mut self, millis: u64) -> Self {
        self.latency = Some(millis);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.upstream_kbps.is_none() && self.downstream_kbps.is_none() && self.latency.is_none()
    }

    /// Build from untyped `key=value` pairs (CLI, config files)
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut limits = Limits::default();
        for (key, value) in pairs {
            let slot = match key {
                "upstream_kbps" => &mut limits.upstream_kbps,
                "downstream_kbps" => &mut limits.downstream_kbps,
                "latency" => &mut limits.latency,
                other => {
                    return Err(Error::invalid(format!(
                        "invalid: {other:?} (valid options: {})",
                        key_list(&Self::KEYS)
                    )))
                }
            };
            let parsed = value.trim().parse::<u64>().map_err(|_| {
                Error::invalid(format!("{key} must be a non-negative integer, got {value:?}"))
            })?;
            *slot = Some(parsed);
        }
        Ok(limits)
    }

    /// Parameters for `PUT limit`. Fails when no limit is set.
    pub fn to_params(&self) -> Result<Params> {
        let mut params = Params::new();
        if let Some(v) = self.upstream_kbps {
            params.push(("upstreamKbps", v.to_string()));
        }
        if let Some(v) = self.downstream_kbps {
            params.push(("downstreamKbps", v.to_string()));
        }
        if let Some(v) = self.latency {
            params.push(("latency", v.to_string()));
        }
        if params.is_empty() {
            return Err(Error::invalid(format!(
                "must specify one of {}",
                key_list(&Self::KEYS)
            )));
        }
        Ok(params)
    }
}

/// Engine timeouts, in seconds. Sent as whole milliseconds (truncated).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    pub request: Option<f64>,
    pub read: Option<f64>,
    pub connection: Option<f64>,
    pub dns_cache: Option<f64>,
}

impl Timeouts {
    pub const KEYS: [&'static str; 4] = ["request", "read", "connection", "dns_cache"];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(mut self, seconds: f64) -> Self {
        self.request = Some(seconds);
        self
    }

    pub fn read(mut self, seconds: f64) -> Self {
        self.read = Some(seconds);
        self
    }

    pub fn connection(mut self, seconds: f64) -> Self {
        self.connection = Some(seconds);
        self
    }

    pub fn dns_cache(mut self, seconds: f64) -> Self {
        self.dns_cache = Some(seconds);
        self
    }

    /// Build from untyped `key=seconds` pairs
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut timeouts = Timeouts::default();
        for (key, value) in pairs {
            let slot = match key {
                "request" => &mut timeouts.request,
                "read" => &mut timeouts.read,
                "connection" => &mut timeouts.connection,
                "dns_cache" => &mut timeouts.dns_cache,
                other => {
                    return Err(Error::invalid(format!(
                        "invalid key: {other:?}, should belong to: {}",
                        key_list(&Self::KEYS)
                    )))
                }
            };
            let parsed = value.trim().parse::<f64>().map_err(|_| {
                Error::invalid(format!("{key} must be a number of seconds, got {value:?}"))
            })?;
            *slot = Some(parsed);
        }
        Ok(timeouts)
    }

    /// Parameters for `PUT timeout`
    pub fn to_params(&self) -> Result<Params> {
        let fields = [
            ("requestTimeout", "request", self.request),
            ("readTimeout", "read", self.read),
            ("connectionTimeout", "connection", self.connection),
            ("dnsCacheTimeout", "dns_cache", self.dns_cache),
        ];
        let mut params = Params::new();
        for (wire, key, seconds) in fields {
            if let Some(seconds) = seconds {
                params.push((wire, seconds_to_millis(key, seconds)?.to_string()));
            }
        }
        Ok(params)
    }
}

/// `floor(seconds * 1000)`
pub fn seconds_to_millis(key: &str, seconds: f64) -> Result<u64> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(Error::invalid(format!(
            "{key} must be a finite, non-negative number of seconds, got {seconds}"
        )));
    }
    Ok((seconds * 1000.0).floor() as u64)
}

fn key_list(keys: &[&str]) -> String {
    format!("[{}]", keys.join(", "))
}

/// A URL pattern in regular-expression syntax
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern(String);

impl Pattern {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Pattern {
    fn from(source: &str) -> Self {
        Pattern(source.to_string())
    }
}

impl From<String> for Pattern {
    fn from(source: String) -> Self {
        Pattern(source)
    }
}

impl From<&String> for Pattern {
    fn from(source: &String) -> Self {
        Pattern(source.clone())
    }
}

impl From<&Regex> for Pattern {
    fn from(regex: &Regex) -> Self {
        Pattern(regex.as_str().to_string())
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Pattern(regex.as_str().to_string())
    }
}

/// Allow-list or deny-list rule: patterns plus the status returned on a hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    patterns: Vec<Pattern>,
    status: u16,
}

impl FilterRule {
    pub fn new<I, P>(patterns: I, status: u16) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<Pattern>,
    {
        let patterns: Vec<Pattern> = patterns.into_iter().map(Into::into).collect();
        if patterns.is_empty() {
            return Err(Error::invalid("at least one pattern is required"));
        }
        if !(100..=999).contains(&status) {
            return Err(Error::invalid(format!(
                "status must be an HTTP status code, got {status}"
            )));
        }
        Ok(Self { patterns, status })
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Pattern sources joined with commas, as the engine expects
    pub fn regex_param(&self) -> String {
        self.patterns
            .iter()
            .map(Pattern::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parameters for `PUT whitelist` / `PUT blacklist`
    pub fn to_params(&self) -> Params {
        vec![
            ("regex", self.regex_param()),
            ("status", self.status.to_string()),
        ]
    }

    /// True if any pattern matches the whole of `url`
    pub fn matches(&self, url: &str) -> Result<bool> {
        for pattern in &self.patterns {
            let anchored = Regex::new(&format!("^(?:{})$", pattern.as_str()))
                .map_err(|e| Error::invalid(format!("invalid pattern {:?}: {e}", pattern.0)))?;
            if anchored.is_match(url) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn keys(params: &Params) -> Vec<&'static str> {
        params.iter().map(|(k, _)| *k).collect()
    }

    #[test]
    fn test_new_har_params_named() {
        assert_eq!(
            new_har_params(Some("foo"), CaptureOptions::default()),
            vec![("initialPageRef", "foo".to_string())]
        );
        assert!(new_har_params(None, CaptureOptions::default()).is_empty());
    }

    #[test]
    fn test_new_har_params_capture_flags() {
        let params = new_har_params(Some("foo"), CaptureOptions::headers());
        assert_eq!(keys(&params), vec!["initialPageRef", "captureHeaders"]);

        let params = new_har_params(None, CaptureOptions::content());
        assert_eq!(keys(&params), vec!["captureContent"]);
    }

    #[test]
    fn test_binary_content_implies_content() {
        for page_ref in [Some("foo"), None] {
            let params = new_har_params(page_ref, CaptureOptions::binary_content());
            assert!(params.contains(&("captureContent", "true".to_string())));
            assert!(params.contains(&("captureBinaryContent", "true".to_string())));
            assert_eq!(
                params.iter().any(|(k, _)| *k == "initialPageRef"),
                page_ref.is_some()
            );
        }
    }

    #[test]
    fn test_limits_individually() {
        assert_eq!(
            Limits::new().downstream_kbps(100).to_params().unwrap(),
            vec![("downstreamKbps", "100".to_string())]
        );
        assert_eq!(
            Limits::new().upstream_kbps(100).to_params().unwrap(),
            vec![("upstreamKbps", "100".to_string())]
        );
        assert_eq!(
            Limits::new().latency(100).to_params().unwrap(),
            vec![("latency", "100".to_string())]
        );
    }

    #[test]
    fn test_limits_combined() {
        let params = Limits::new()
            .latency(100)
            .downstream_kbps(200)
            .upstream_kbps(300)
            .to_params()
            .unwrap();
        assert_eq!(
            params,
            vec![
                ("upstreamKbps", "300".to_string()),
                ("downstreamKbps", "200".to_string()),
                ("latency", "100".to_string()),
            ]
        );
    }

    #[test]
    fn test_limits_empty_is_invalid() {
        let err = Limits::new().to_params().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(err.to_string().contains("upstream_kbps"));
    }

    #[test]
    fn test_limits_from_pairs() {
        let limits = Limits::from_pairs([("latency", "50"), ("upstream_kbps", "128")]).unwrap();
        assert_eq!(limits, Limits::new().latency(50).upstream_kbps(128));

        let err = Limits::from_pairs([("foo", "1")]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(err
            .to_string()
            .contains("[upstream_kbps, downstream_kbps, latency]"));

        assert!(Limits::from_pairs([("latency", "fast")]).is_err());
        let empty: Vec<(&str, &str)> = Vec::new();
        assert!(Limits::from_pairs(empty).unwrap().to_params().is_err());
    }

    #[test]
    fn test_limits_reject_unknown_yaml_keys() {
        assert!(serde_yaml::from_str::<Limits>("latency: 10\nfoo: 1").is_err());
    }

    #[test]
    fn test_timeouts_to_millis() {
        let params = Timeouts::new()
            .request(0.001)
            .read(2.0)
            .connection(3.0)
            .dns_cache(6000.0)
            .to_params()
            .unwrap();
        assert_eq!(
            params,
            vec![
                ("requestTimeout", "1".to_string()),
                ("readTimeout", "2000".to_string()),
                ("connectionTimeout", "3000".to_string()),
                ("dnsCacheTimeout", "6000000".to_string()),
            ]
        );
    }

    #[test]
    fn test_timeouts_truncate() {
        let params = Timeouts::new().read(1.9999).to_params().unwrap();
        assert_eq!(params, vec![("readTimeout", "1999".to_string())]);
    }

    #[test]
    fn test_timeouts_invalid_key_names_valid_keys() {
        let err = Timeouts::from_pairs([("invalid", "2")]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(
            err.to_string(),
            "invalid argument: invalid key: \"invalid\", should belong to: [request, read, connection, dns_cache]"
        );
    }

    #[test]
    fn test_timeouts_reject_out_of_range() {
        assert!(Timeouts::new().read(-1.0).to_params().is_err());
        assert!(Timeouts::new().read(f64::NAN).to_params().is_err());
        assert!(Timeouts::new().read(f64::INFINITY).to_params().is_err());
    }

    proptest! {
        #[test]
        fn prop_millis_is_floor(seconds in 0.0f64..1_000_000.0) {
            let millis = seconds_to_millis("read", seconds).unwrap();
            prop_assert_eq!(millis, (seconds * 1000.0).floor() as u64);
            prop_assert!(millis as f64 <= seconds * 1000.0);
        }
    }

    #[test]
    fn test_filter_rule_joins_patterns() {
        let rule = FilterRule::new(
            [
                Pattern::from(Regex::new(r"http://example\.com/1/.+").unwrap()),
                Pattern::from(r"http://example\.com/2/.+"),
            ],
            401,
        )
        .unwrap();
        assert_eq!(
            rule.to_params(),
            vec![
                ("regex", r"http://example\.com/1/.+,http://example\.com/2/.+".to_string()),
                ("status", "401".to_string()),
            ]
        );
    }

    #[test]
    fn test_filter_rule_requires_patterns() {
        let none: Vec<&str> = Vec::new();
        assert!(matches!(
            FilterRule::new(none, 200),
            Err(Error::InvalidArgument(_))
        ));
        assert!(FilterRule::new(["x"], 42).is_err());
    }

    #[test]
    fn test_filter_rule_matches_whole_url() {
        let rule = FilterRule::new([r"https?://example\.com/.*"], 404).unwrap();
        assert!(rule.matches("http://example.com/a").unwrap());
        assert!(!rule.matches("http://evil.com/?r=http://example.com/a").unwrap());

        let rule = FilterRule::new(["example"], 404).unwrap();
        assert!(!rule.matches("http://example.com/").unwrap());
    }
}
