//! Request routing and the api resource handlers.

use relay_protocol::{
    ColorMode, HandshakeData, VersionData, WsRequest, API_VERSION, API_VERSION_NUMBER,
};
use relay_eval::eval_simple;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::auth;
use crate::client::{ClientSession, ClientStatus, WsStatus};
use crate::http::HttpRequest;
use crate::msg;

type Handler = fn(&mut ClientSession, &HttpRequest);

struct Route {
    method: &'static str,
    resource: &'static str,
    auth_required: bool,
    min_args: usize,
    /// `None` means unlimited.
    max_args: Option<usize>,
    handler: Handler,
}

const ROUTES: &[Route] = &[
    Route { method: "OPTIONS", resource: "*",          auth_required: false, min_args: 0, max_args: None,    handler: cb_options },
    Route { method: "POST",    resource: "handshake",  auth_required: false, min_args: 0, max_args: Some(0), handler: cb_handshake },
    Route { method: "GET",     resource: "version",    auth_required: true,  min_args: 0, max_args: Some(0), handler: cb_version },
    Route { method: "GET",     resource: "buffers",    auth_required: true,  min_args: 0, max_args: Some(3), handler: cb_buffers },
    Route { method: "GET",     resource: "hotlist",    auth_required: true,  min_args: 0, max_args: Some(3), handler: cb_hotlist },
    Route { method: "POST",    resource: "completion", auth_required: true,  min_args: 0, max_args: Some(0), handler: cb_completion },
    Route { method: "POST",    resource: "input",      auth_required: true,  min_args: 0, max_args: Some(0), handler: cb_input },
    Route { method: "POST",    resource: "ping",       auth_required: true,  min_args: 0, max_args: Some(0), handler: cb_ping },
    Route { method: "POST",    resource: "sync",       auth_required: true,  min_args: 0, max_args: Some(0), handler: cb_sync },
];

/// Routes one complete request to its handler.
pub fn dispatch(session: &mut ClientSession, request: &HttpRequest) {
    session.current_request = Some(request.clone());
    dispatch_inner(session, request);
    session.current_request = None;
}

fn dispatch_inner(session: &mut ClientSession, request: &HttpRequest) {
    if session.status.has_ended() {
        return;
    }
    debug!(
        client = %session.desc,
        method = %request.method,
        path = %request.path,
        "request"
    );

    if request.path_items.len() < 2 || request.path_items[0] != "api" {
        msg::send_json(session, 404, None, None, None);
        return;
    }
    let num_args = request.path_items.len() - 2;

    for route in ROUTES {
        if route.method != request.method {
            continue;
        }
        if route.resource != "*" && route.resource != request.path_items[1] {
            continue;
        }

        if route.auth_required && session.status != ClientStatus::Connected {
            match auth::check_auth(&session.state.host, request) {
                Ok(()) => session.set_status(ClientStatus::Connected),
                Err(e) => {
                    warn!(client = %session.desc, error = %e, "authentication failed");
                    msg::send_error_json(session, 401, &e.to_string());
                    session.set_status(ClientStatus::AuthFailed);
                    session.close_after_flush = true;
                    return;
                }
            }
        }

        if num_args < route.min_args || route.max_args.is_some_and(|max| num_args > max) {
            warn!(
                client = %session.desc,
                resource = route.resource,
                num_args,
                "argument count out of range"
            );
            msg::send_json(session, 404, None, None, None);
            return;
        }

        (route.handler)(session, request);
        return;
    }

    msg::send_json(session, 404, None, None, None);
}

/// Entry point for WebSocket text messages: unwraps the JSON request
/// envelope into an HTTP-shaped request, then routes it normally.
pub fn handle_json(session: &mut ClientSession, payload: &[u8]) {
    let Ok(ws_request) = serde_json::from_slice::<WsRequest>(payload) else {
        bad_envelope(session);
        return;
    };
    let mut request = HttpRequest::default();
    if !request.parse_method_path(&ws_request.request) {
        bad_envelope(session);
        return;
    }
    request.id = ws_request.request_id;
    if let Some(body) = ws_request.body {
        request.body = serde_json::to_vec(&body).unwrap_or_default();
        request.content_length = request.body.len();
    }
    dispatch(session, &request);
}

fn bad_envelope(session: &mut ClientSession) {
    session.current_request = Some(HttpRequest::default());
    msg::send_json(session, 400, None, None, None);
    session.current_request = None;
}

fn parse_body(request: &HttpRequest) -> Option<Value> {
    if request.body.is_empty() {
        return None;
    }
    serde_json::from_slice(&request.body).ok()
}

enum BufferTarget {
    Found(i64),
    NotFound(String),
    Malformed,
}

/// Resolves `buffer_id` / `buffer_name` from a request body; no key
/// means the main buffer.
fn resolve_buffer(session: &ClientSession, body: Option<&Value>) -> BufferTarget {
    let host = &session.state.host;
    if let Some(body) = body {
        if let Some(id_value) = body.get("buffer_id") {
            let Some(id) = id_value.as_i64() else {
                return BufferTarget::Malformed;
            };
            return match host.find_buffer(&id.to_string()) {
                Some(found) => BufferTarget::Found(found),
                None => BufferTarget::NotFound(format!("Buffer \"{id}\" not found")),
            };
        }
        if let Some(name_value) = body.get("buffer_name") {
            let Some(name) = name_value.as_str() else {
                return BufferTarget::Malformed;
            };
            return match host.find_buffer_by_name(name) {
                Some(found) => BufferTarget::Found(found),
                None => BufferTarget::NotFound(format!("Buffer \"{name}\" not found")),
            };
        }
    }
    match host.main_buffer_id() {
        Some(id) => BufferTarget::Found(id),
        None => BufferTarget::Malformed,
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn cb_options(session: &mut ClientSession, _request: &HttpRequest) {
    msg::send_json(
        session,
        204,
        Some(
            "Access-Control-Allow-Methods: GET, POST, PUT, DELETE\r\n\
             Access-Control-Allow-Headers: origin, content-type, accept, authorization",
        ),
        None,
        None,
    );
}

fn cb_handshake(session: &mut ClientSession, request: &HttpRequest) {
    let config = session.state.host.config();
    let client_algos: Vec<String> = parse_body(request)
        .and_then(|body| {
            body.get("password_hash_algo").and_then(|list| {
                list.as_array().map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(ToOwned::to_owned))
                        .collect()
                })
            })
        })
        .unwrap_or_default();

    let algo = auth::negotiate_hash_algo(&client_algos, &config.network.password_hash_algo);
    let totp_secret = eval_simple(&config.network.totp_secret, &session.state.host);
    let handshake = HandshakeData {
        password_hash_algo: algo.map(ToOwned::to_owned),
        password_hash_iterations: config.network.password_hash_iterations,
        totp: !totp_secret.is_empty(),
    };
    msg::send_json(
        session,
        200,
        None,
        Some("handshake"),
        serde_json::to_value(handshake).ok(),
    );
}

fn cb_version(session: &mut ClientSession, _request: &HttpRequest) {
    let host = &session.state.host;
    let version = VersionData {
        weechat_version: host.info_get("version", None).unwrap_or_default(),
        weechat_version_git: host.info_get("version_git", None).unwrap_or_default(),
        weechat_version_number: host
            .info_get("version_number", None)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        relay_api_version: API_VERSION.to_owned(),
        relay_api_version_number: API_VERSION_NUMBER,
    };
    msg::send_json(
        session,
        200,
        None,
        Some("version"),
        serde_json::to_value(version).ok(),
    );
}

#[allow(clippy::too_many_lines)]
fn cb_buffers(session: &mut ClientSession, request: &HttpRequest) {
    let host = session.state.host.clone();
    let num_args = request.path_items.len() - 2;
    let colors = ColorMode::from_selector(request.param("colors").unwrap_or("ansi"));
    let nicks = request.param_bool("nicks", false);

    let buffer_id = if num_args >= 1 {
        let target = &request.path_items[2];
        match host.find_buffer(target) {
            Some(id) => Some(id),
            None => {
                msg::send_error_json(session, 404, &format!("Buffer \"{target}\" not found"));
                return;
            }
        }
    } else {
        None
    };

    if num_args >= 2 {
        let buffer_id = buffer_id.expect("sub-resource implies a buffer");
        let sub_resource = request.path_items[3].as_str();
        match sub_resource {
            "lines" => {
                let lines = request.param_i64("lines", i64::MAX);
                let line_id: Option<i64> = request
                    .path_items
                    .get(4)
                    .and_then(|item| item.parse().ok());
                let body = host.with_buffer(buffer_id, |b| {
                    let mut all = b.lines_to_wire(lines, colors);
                    if let Some(wanted) = line_id {
                        all.retain(|line| line.id == wanted);
                    }
                    all
                });
                msg::send_json(
                    session,
                    200,
                    None,
                    Some("buffer"),
                    body.and_then(|b| serde_json::to_value(b).ok()),
                );
            }
            "nicks" => {
                let body = host
                    .with_buffer(buffer_id, |b| {
                        b.nick_group_to_wire(b.root_group_id, colors)
                    })
                    .flatten();
                msg::send_json(
                    session,
                    200,
                    None,
                    Some("buffer"),
                    body.and_then(|b| serde_json::to_value(b).ok()),
                );
            }
            other => {
                msg::send_error_json(
                    session,
                    404,
                    &format!("Sub-resource of buffers not found: \"{other}\""),
                );
            }
        }
        return;
    }

    let lines = request.param_i64("lines", 0);
    let lines_free = request.param_i64("lines_free", if lines == 0 { 0 } else { i64::MAX });

    let body = match buffer_id {
        Some(id) => host
            .with_buffer(id, |b| b.to_wire(lines, lines_free, nicks, colors))
            .and_then(|b| serde_json::to_value(b).ok()),
        None => {
            let buffers: Vec<_> = host
                .buffer_ids()
                .into_iter()
                .filter_map(|id| {
                    host.with_buffer(id, |b| b.to_wire(lines, lines_free, nicks, colors))
                })
                .collect();
            serde_json::to_value(buffers).ok()
        }
    };
    msg::send_json(session, 200, None, Some("buffer"), body);
}

fn cb_hotlist(session: &mut ClientSession, _request: &HttpRequest) {
    let entries = session.state.host.hotlist_sorted();
    msg::send_json(
        session,
        200,
        None,
        Some("hotlist"),
        serde_json::to_value(entries).ok(),
    );
}

fn cb_completion(session: &mut ClientSession, request: &HttpRequest) {
    let Some(body) = parse_body(request) else {
        msg::send_json(session, 400, None, None, None);
        return;
    };
    let buffer_id = match resolve_buffer(session, Some(&body)) {
        BufferTarget::Found(id) => id,
        BufferTarget::NotFound(message) => {
            msg::send_error_json(session, 404, &message);
            return;
        }
        BufferTarget::Malformed => {
            msg::send_json(session, 400, None, None, None);
            return;
        }
    };
    let Some(command) = body.get("command").and_then(Value::as_str) else {
        msg::send_json(session, 400, None, None, None);
        return;
    };
    let position = body
        .get("position")
        .and_then(Value::as_u64)
        .map_or(command.len(), |p| usize::try_from(p).unwrap_or(usize::MAX));
    let completion = session.state.host.complete(buffer_id, command, position);
    msg::send_json(
        session,
        200,
        None,
        Some("completion"),
        serde_json::to_value(completion).ok(),
    );
}

fn cb_input(session: &mut ClientSession, request: &HttpRequest) {
    let Some(body) = parse_body(request) else {
        msg::send_json(session, 400, None, None, None);
        return;
    };
    let buffer_id = match resolve_buffer(session, Some(&body)) {
        BufferTarget::Found(id) => id,
        BufferTarget::NotFound(message) => {
            msg::send_error_json(session, 404, &message);
            return;
        }
        BufferTarget::Malformed => {
            msg::send_json(session, 400, None, None, None);
            return;
        }
    };
    let Some(command) = body.get("command").and_then(Value::as_str) else {
        msg::send_json(session, 400, None, None, None);
        return;
    };
    // delayed execution: never run commands from inside the request
    // path (an /upgrade must not tear down the stack it runs on)
    session.state.host.schedule_command(
        buffer_id,
        command.to_owned(),
        std::time::Duration::from_millis(1),
    );
    msg::send_json(session, 204, None, None, None);
}

fn cb_ping(session: &mut ClientSession, request: &HttpRequest) {
    let data = parse_body(request)
        .and_then(|body| body.get("data").and_then(Value::as_str).map(ToOwned::to_owned));
    match data {
        Some(data) => msg::send_json(session, 200, None, Some("ping"), Some(json!({ "data": data }))),
        None => msg::send_json(session, 204, None, None, None),
    }
}

fn cb_sync(session: &mut ClientSession, request: &HttpRequest) {
    if session.websocket != WsStatus::Ready {
        msg::send_error_json(
            session,
            403,
            "Sync resource is available only with a websocket connection",
        );
        return;
    }

    session.sync_enabled = true;
    session.sync_nicks = true;
    session.sync_input = true;
    session.sync_colors = ColorMode::Ansi;

    if let Some(body) = parse_body(request) {
        if let Some(sync) = body.get("sync").and_then(Value::as_bool) {
            session.sync_enabled = sync;
        }
        if let Some(nicks) = body.get("nicks").and_then(Value::as_bool) {
            session.sync_nicks = nicks;
        }
        if let Some(input) = body.get("input").and_then(Value::as_bool) {
            session.sync_input = input;
        }
        if let Some(colors) = body.get("colors").and_then(Value::as_str) {
            session.sync_colors = ColorMode::from_selector(colors);
        }
    }

    msg::send_json(session, 204, None, None, None);
}
