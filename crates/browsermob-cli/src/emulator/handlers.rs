//! Handlers for the engine control endpoints.

use std::collections::BTreeMap;

use browsermob_proxy::CaptureOptions;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::{debug, info};

use super::state::{Credentials, EmulatorState, FilterSetting, Instance, RewriteSetting, StateError};
use super::types::*;

const LIMIT_PARAMS: [&str; 3] = ["upstreamKbps", "downstreamKbps", "latency"];
const TIMEOUT_PARAMS: [&str; 4] = [
    "requestTimeout",
    "readTimeout",
    "connectionTimeout",
    "dnsCacheTimeout",
];

#[derive(Serialize)]
struct PortBody {
    port: u16,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProxyList {
    proxy_list: Vec<PortBody>,
}

fn state_error(e: StateError) -> Response<Full<Bytes>> {
    let status = match e {
        StateError::PortInUse(_) | StateError::NoFreePort => StatusCode::CONFLICT,
        StateError::UnknownInstance(_) | StateError::NoSession(_) => StatusCode::NOT_FOUND,
    };
    error_response(status, &e.to_string())
}

/// Run `f` on the instance and reply with its response
fn on_instance(
    state: &EmulatorState,
    port: u16,
    f: impl FnOnce(&mut Instance) -> Response<Full<Bytes>>,
) -> Response<Full<Bytes>> {
    state.with_instance(port, f).unwrap_or_else(state_error)
}

/// GET /proxy
pub fn handle_list(state: &EmulatorState) -> Response<Full<Bytes>> {
    let proxy_list = state.ports().into_iter().map(|port| PortBody { port }).collect();
    json_response(StatusCode::OK, &ProxyList { proxy_list })
}

/// POST /proxy
pub fn handle_create(state: &EmulatorState, params: &FormParams) -> Response<Full<Bytes>> {
    let requested = match params.number::<u16>("port") {
        Ok(port) => port,
        Err(e) => return bad_request(&e),
    };
    match state.allocate(requested) {
        Ok(port) => {
            info!("Allocated instance on port {}", port);
            json_response(StatusCode::OK, &PortBody { port })
        }
        Err(e) => state_error(e),
    }
}

/// DELETE /proxy/:port
pub fn handle_delete(state: &EmulatorState, port: u16) -> Response<Full<Bytes>> {
    match state.remove(port) {
        Ok(()) => {
            info!("Deleted instance on port {}", port);
            ok()
        }
        Err(e) => state_error(e),
    }
}

/// PUT /proxy/:port/har - open a new session, reply with the previous one
pub fn handle_new_har(state: &EmulatorState, port: u16, params: &FormParams) -> Response<Full<Bytes>> {
    let capture = CaptureOptions {
        capture_headers: params.flag("captureHeaders"),
        capture_content: params.flag("captureContent"),
        capture_binary_content: params.flag("captureBinaryContent"),
    };
    let page_ref = params.get("initialPageRef");
    debug!("New HAR on {} (page {:?}, {:?})", port, page_ref, capture);

    on_instance(state, port, |instance| {
        match instance.new_har(page_ref, capture) {
            Some(previous) => json_response(StatusCode::OK, &previous),
            None => no_content(),
        }
    })
}

/// GET /proxy/:port/har
pub fn handle_get_har(state: &EmulatorState, port: u16) -> Response<Full<Bytes>> {
    on_instance(state, port, |instance| match instance.har() {
        Some(har) => json_response(StatusCode::OK, har),
        None => no_content(),
    })
}

/// PUT /proxy/:port/har/pageRef
pub fn handle_new_page(state: &EmulatorState, port: u16, params: &FormParams) -> Response<Full<Bytes>> {
    let Some(page_ref) = params.get("pageRef") else {
        return bad_request("pageRef is required");
    };
    on_instance(state, port, |instance| {
        if instance.new_page(page_ref) {
            ok()
        } else {
            state_error(StateError::NoSession(port))
        }
    })
}

fn parse_filter(params: &FormParams) -> Result<FilterSetting, String> {
    let regex = params
        .get("regex")
        .filter(|r| !r.is_empty())
        .ok_or("regex is required")?;
    let status = params.number::<u16>("status")?.ok_or("status is required")?;
    Ok(FilterSetting {
        regex: regex.to_string(),
        status,
    })
}

/// PUT /proxy/:port/whitelist
pub fn handle_set_whitelist(state: &EmulatorState, port: u16, params: &FormParams) -> Response<Full<Bytes>> {
    match parse_filter(params) {
        Ok(rule) => on_instance(state, port, |instance| {
            instance.whitelist = Some(rule);
            ok()
        }),
        Err(e) => bad_request(&e),
    }
}

/// PUT /proxy/:port/blacklist
pub fn handle_set_blacklist(state: &EmulatorState, port: u16, params: &FormParams) -> Response<Full<Bytes>> {
    match parse_filter(params) {
        Ok(rule) => on_instance(state, port, |instance| {
            instance.blacklist = Some(rule);
            ok()
        }),
        Err(e) => bad_request(&e),
    }
}

/// DELETE /proxy/:port/whitelist
pub fn handle_clear_whitelist(state: &EmulatorState, port: u16) -> Response<Full<Bytes>> {
    on_instance(state, port, |instance| {
        instance.whitelist = None;
        ok()
    })
}

/// DELETE /proxy/:port/blacklist
pub fn handle_clear_blacklist(state: &EmulatorState, port: u16) -> Response<Full<Bytes>> {
    on_instance(state, port, |instance| {
        instance.blacklist = None;
        ok()
    })
}

/// PUT /proxy/:port/rewrite
pub fn handle_set_rewrite(state: &EmulatorState, port: u16, params: &FormParams) -> Response<Full<Bytes>> {
    let (Some(match_regex), Some(replace)) = (params.get("matchRegex"), params.get("replace")) else {
        return bad_request("matchRegex and replace are required");
    };
    let rule = RewriteSetting {
        match_regex: match_regex.to_string(),
        replace: replace.to_string(),
    };
    on_instance(state, port, |instance| {
        instance.rewrite = Some(rule);
        ok()
    })
}

/// DELETE /proxy/:port/rewrite
pub fn handle_clear_rewrite(state: &EmulatorState, port: u16) -> Response<Full<Bytes>> {
    on_instance(state, port, |instance| {
        instance.rewrite = None;
        ok()
    })
}

fn string_map(body: &[u8]) -> Result<BTreeMap<String, String>, String> {
    serde_json::from_slice(body).map_err(|e| format!("expected a JSON object of strings: {e}"))
}

/// POST /proxy/:port/headers
pub fn handle_headers(state: &EmulatorState, port: u16, body: &[u8]) -> Response<Full<Bytes>> {
    match string_map(body) {
        Ok(headers) => on_instance(state, port, |instance| {
            instance.headers.extend(headers);
            ok()
        }),
        Err(e) => bad_request(&e),
    }
}

/// POST /proxy/:port/hosts - merged into the existing table
pub fn handle_hosts(state: &EmulatorState, port: u16, body: &[u8]) -> Response<Full<Bytes>> {
    match string_map(body) {
        Ok(hosts) => on_instance(state, port, |instance| {
            instance.hosts.extend(hosts);
            ok()
        }),
        Err(e) => bad_request(&e),
    }
}

/// POST /proxy/:port/auth/basic/:domain
pub fn handle_basic_auth(
    state: &EmulatorState,
    port: u16,
    domain: &str,
    body: &[u8],
) -> Response<Full<Bytes>> {
    let credentials: Credentials = match serde_json::from_slice(body) {
        Ok(c) => c,
        Err(e) => return bad_request(&format!("expected {{\"username\",\"password\"}}: {e}")),
    };
    on_instance(state, port, |instance| {
        instance.basic_auth.insert(domain.to_string(), credentials);
        ok()
    })
}

/// Read the listed integer params; unknown params are ignored like the engine does
fn numeric_params(params: &FormParams, names: &[&str]) -> Result<BTreeMap<String, u64>, String> {
    let mut values = BTreeMap::new();
    for name in names {
        if let Some(v) = params.number::<u64>(name)? {
            values.insert(name.to_string(), v);
        }
    }
    Ok(values)
}

/// PUT /proxy/:port/limit - unspecified limits keep their value
pub fn handle_limit(state: &EmulatorState, port: u16, params: &FormParams) -> Response<Full<Bytes>> {
    match numeric_params(params, &LIMIT_PARAMS) {
        Ok(limits) => on_instance(state, port, |instance| {
            instance.limits.extend(limits);
            ok()
        }),
        Err(e) => bad_request(&e),
    }
}

/// PUT /proxy/:port/timeout
pub fn handle_timeout(state: &EmulatorState, port: u16, params: &FormParams) -> Response<Full<Bytes>> {
    match numeric_params(params, &TIMEOUT_PARAMS) {
        Ok(timeouts) => on_instance(state, port, |instance| {
            instance.timeouts.extend(timeouts);
            ok()
        }),
        Err(e) => bad_request(&e),
    }
}

/// POST /proxy/:port/interceptor/{request,response}
pub fn handle_interceptor(
    state: &EmulatorState,
    port: u16,
    response_side: bool,
    body: &[u8],
) -> Response<Full<Bytes>> {
    let script = String::from_utf8_lossy(body).into_owned();
    on_instance(state, port, |instance| {
        if response_side {
            instance.response_interceptor = Some(script);
        } else {
            instance.request_interceptor = Some(script);
        }
        ok()
    })
}
