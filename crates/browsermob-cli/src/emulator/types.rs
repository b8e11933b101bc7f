//! Response helpers and form decoding for the emulator's control API.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;

/// Error body, shaped like the engine's
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Create a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    build_response_with_headers(status, [("Content-Type", "application/json")], json)
}

/// 200 with an empty body
pub fn ok() -> Response<Full<Bytes>> {
    build_response(StatusCode::OK, Bytes::new())
}

/// 204: the engine's "nothing to return" (e.g. no capture session)
pub fn no_content() -> Response<Full<Bytes>> {
    build_response(StatusCode::NO_CONTENT, Bytes::new())
}

pub fn build_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from("Internal Server Error"))))
}

pub fn build_response_with_headers(
    status: StatusCode,
    headers: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    for (key, value) in headers {
        builder = builder.header(key.as_ref(), value.as_ref());
    }
    builder
        .body(Full::new(body.into()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from("Internal Server Error"))))
}

pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(
        status,
        &ErrorResponse {
            error: message.to_string(),
        },
    )
}

pub fn bad_request(message: &str) -> Response<Full<Bytes>> {
    error_response(StatusCode::BAD_REQUEST, message)
}

pub fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

pub fn method_not_allowed() -> Response<Full<Bytes>> {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

/// Collect request body into bytes
pub async fn collect_body(req: Request<Incoming>) -> Result<Bytes, String> {
    use http_body_util::BodyExt;
    req.collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| format!("Failed to read request body: {e}"))
}

/// Parameters from the query string and a form-urlencoded body, query first
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormParams(Vec<(String, String)>);

impl FormParams {
    pub fn parse(query: Option<&str>, body: &[u8]) -> Self {
        let mut params = Vec::new();
        if let Some(query) = query {
            decode_into(query, &mut params);
        }
        decode_into(&String::from_utf8_lossy(body), &mut params);
        FormParams(params)
    }

    /// Last value supplied for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn flag(&self, name: &str) -> bool {
        self.get(name) == Some("true")
    }

    /// Parse `name` as a number; `Ok(None)` when absent
    pub fn number<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>, String> {
        self.get(name)
            .map(|v| {
                v.parse::<T>()
                    .map_err(|_| format!("{name} must be a number, got {v:?}"))
            })
            .transpose()
    }
}

fn decode_into(encoded: &str, out: &mut Vec<(String, String)>) {
    for pair in encoded.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        out.push((decode_component(key), decode_component(value)));
    }
}

fn decode_component(s: &str) -> String {
    let spaced = s.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|c| c.into_owned())
        .unwrap_or(spaced)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_params() {
        let params = FormParams::parse(
            Some("port=9095"),
            b"regex=http%3A%2F%2F.*%5C.com%2F.*%2Chttp%3A%2F%2Fb.test%2F&status=404&captureHeaders=true",
        );
        assert_eq!(params.get("port"), Some("9095"));
        assert_eq!(
            params.get("regex"),
            Some(r"http://.*\.com/.*,http://b.test/")
        );
        assert_eq!(params.number::<u16>("status"), Ok(Some(404)));
        assert!(params.flag("captureHeaders"));
        assert!(!params.flag("captureContent"));
    }

    #[test]
    fn test_plus_is_space() {
        let params = FormParams::parse(None, b"pageRef=Page+2");
        assert_eq!(params.get("pageRef"), Some("Page 2"));
    }

    #[test]
    fn test_bad_number() {
        let params = FormParams::parse(None, b"latency=soon");
        assert!(params.number::<u64>("latency").is_err());
        assert_eq!(params.number::<u64>("upstreamKbps"), Ok(None));
    }
}
