//! Route dispatch for the emulated control API.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use tracing::debug;

use super::handlers;
use super::state::EmulatorState;
use super::types::*;

/// Parsed route for instance endpoints
#[derive(Debug, PartialEq, Eq)]
enum InstanceRoute {
    /// DELETE /proxy/:port
    Root,
    /// PUT/GET /proxy/:port/har
    Har,
    /// PUT /proxy/:port/har/pageRef
    PageRef,
    /// PUT/DELETE /proxy/:port/whitelist
    Whitelist,
    /// PUT/DELETE /proxy/:port/blacklist
    Blacklist,
    /// PUT/DELETE /proxy/:port/rewrite
    Rewrite,
    /// PUT /proxy/:port/limit
    Limit,
    /// PUT /proxy/:port/timeout
    Timeout,
    /// POST /proxy/:port/headers
    Headers,
    /// POST /proxy/:port/hosts
    Hosts,
    /// POST /proxy/:port/interceptor/request
    RequestInterceptor,
    /// POST /proxy/:port/interceptor/response
    ResponseInterceptor,
    /// POST /proxy/:port/auth/basic/:domain
    BasicAuth(String),
}

impl InstanceRoute {
    /// Parse route from path segments after `/proxy/:port`
    fn parse(segments: &[&str]) -> Option<Self> {
        match segments {
            [] | [""] => Some(InstanceRoute::Root),
            ["har"] => Some(InstanceRoute::Har),
            ["har", "pageRef"] => Some(InstanceRoute::PageRef),
            ["whitelist"] => Some(InstanceRoute::Whitelist),
            ["blacklist"] => Some(InstanceRoute::Blacklist),
            ["rewrite"] => Some(InstanceRoute::Rewrite),
            ["limit"] => Some(InstanceRoute::Limit),
            ["timeout"] => Some(InstanceRoute::Timeout),
            ["headers"] => Some(InstanceRoute::Headers),
            ["hosts"] => Some(InstanceRoute::Hosts),
            ["interceptor", "request"] => Some(InstanceRoute::RequestInterceptor),
            ["interceptor", "response"] => Some(InstanceRoute::ResponseInterceptor),
            ["auth", "basic", domain] if !domain.is_empty() => urlencoding::decode(domain)
                .ok()
                .map(|d| InstanceRoute::BasicAuth(d.into_owned())),
            _ => None,
        }
    }
}

/// Main request router
pub async fn route_request(
    req: Request<Incoming>,
    state: Arc<EmulatorState>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|s| s.to_string());

    debug!("Emulator: {} {}", method, path);

    if !state.is_ready() {
        return Ok(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "engine is still initializing",
        ));
    }

    let body = match collect_body(req).await {
        Ok(b) => b,
        Err(e) => return Ok(bad_request(&e)),
    };

    Ok(route_by_path(&method, &path, query.as_deref(), &body, &state))
}

fn route_by_path(
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &[u8],
    state: &EmulatorState,
) -> Response<Full<Bytes>> {
    if path == "/proxy" || path == "/proxy/" {
        return match *method {
            Method::GET => handlers::handle_list(state),
            Method::POST => handlers::handle_create(state, &FormParams::parse(query, body)),
            _ => method_not_allowed(),
        };
    }

    if let Some(rest) = path.strip_prefix("/proxy/") {
        return route_instance(method, rest, query, body, state);
    }

    not_found()
}

fn route_instance(
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &[u8],
    state: &EmulatorState,
) -> Response<Full<Bytes>> {
    let segments: Vec<&str> = path.split('/').collect();
    let Some((port, rest)) = segments.split_first() else {
        return not_found();
    };
    let Ok(port) = port.parse::<u16>() else {
        return not_found();
    };
    let Some(route) = InstanceRoute::parse(rest) else {
        return not_found();
    };

    let form = || FormParams::parse(query, body);

    match (route, method) {
        (InstanceRoute::Root, &Method::DELETE) => handlers::handle_delete(state, port),
        (InstanceRoute::Har, &Method::PUT) => handlers::handle_new_har(state, port, &form()),
        (InstanceRoute::Har, &Method::GET) => handlers::handle_get_har(state, port),
        (InstanceRoute::PageRef, &Method::PUT) => handlers::handle_new_page(state, port, &form()),
        (InstanceRoute::Whitelist, &Method::PUT) => {
            handlers::handle_set_whitelist(state, port, &form())
        }
        (InstanceRoute::Whitelist, &Method::DELETE) => handlers::handle_clear_whitelist(state, port),
        (InstanceRoute::Blacklist, &Method::PUT) => {
            handlers::handle_set_blacklist(state, port, &form())
        }
        (InstanceRoute::Blacklist, &Method::DELETE) => handlers::handle_clear_blacklist(state, port),
        (InstanceRoute::Rewrite, &Method::PUT) => handlers::handle_set_rewrite(state, port, &form()),
        (InstanceRoute::Rewrite, &Method::DELETE) => handlers::handle_clear_rewrite(state, port),
        (InstanceRoute::Limit, &Method::PUT) => handlers::handle_limit(state, port, &form()),
        (InstanceRoute::Timeout, &Method::PUT) => handlers::handle_timeout(state, port, &form()),
        (InstanceRoute::Headers, &Method::POST) => handlers::handle_headers(state, port, body),
        (InstanceRoute::Hosts, &Method::POST) => handlers::handle_hosts(state, port, body),
        (InstanceRoute::RequestInterceptor, &Method::POST) => {
            handlers::handle_interceptor(state, port, false, body)
        }
        (InstanceRoute::ResponseInterceptor, &Method::POST) => {
            handlers::handle_interceptor(state, port, true, body)
        }
        (InstanceRoute::BasicAuth(domain), &Method::POST) => {
            handlers::handle_basic_auth(state, port, &domain, body)
        }
        _ => method_not_allowed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_route_parse() {
        assert_eq!(InstanceRoute::parse(&[]), Some(InstanceRoute::Root));
        assert_eq!(InstanceRoute::parse(&["har"]), Some(InstanceRoute::Har));
        assert_eq!(
            InstanceRoute::parse(&["har", "pageRef"]),
            Some(InstanceRoute::PageRef)
        );
        assert_eq!(
            InstanceRoute::parse(&["interceptor", "response"]),
            Some(InstanceRoute::ResponseInterceptor)
        );
        assert_eq!(
            InstanceRoute::parse(&["auth", "basic", "example%2Ecom"]),
            Some(InstanceRoute::BasicAuth("example.com".into()))
        );
        assert_eq!(InstanceRoute::parse(&["auth", "basic", ""]), None);
        assert_eq!(InstanceRoute::parse(&["harr"]), None);
    }
}
