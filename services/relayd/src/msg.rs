//! Response and event encoding.
//!
//! One entry point per message kind; the client's transport mode picks
//! the wire form (bare HTTP response vs WebSocket JSON envelope in a
//! text frame).

use relay_protocol::{ErrorBody, WsEvent, WsResponse};
use serde_json::Value;

use crate::client::{ClientSession, WsStatus};
use crate::http::{http_response, status_message};
use crate::websocket::text_frame;

/// Sends a JSON reply for the request currently being handled.
pub fn send_json(
    session: &mut ClientSession,
    code: u16,
    extra_headers: Option<&str>,
    body_type: Option<&str>,
    body: Option<Value>,
) {
    if session.websocket == WsStatus::Ready {
        let (request, request_body, request_id) = request_echo(session);
        let envelope = WsResponse {
            code,
            message: status_message(code).to_owned(),
            request,
            request_body,
            request_id,
            body_type: body_type.map(ToOwned::to_owned),
            body: body.unwrap_or(Value::Null),
        };
        if let Ok(json) = serde_json::to_string(&envelope) {
            session.queue(text_frame(&json));
        }
    } else {
        let body_string = body.and_then(|b| serde_json::to_string(&b).ok());
        session.queue(http_response(code, extra_headers, body_string.as_deref()));
    }
}

/// Sends `{"error": message}` with the given status code.
pub fn send_error_json(session: &mut ClientSession, code: u16, message: &str) {
    let body = serde_json::to_value(ErrorBody {
        error: message.to_owned(),
    })
    .ok();
    send_json(session, code, None, None, body);
}

/// Sends an event to a WebSocket-ready client. Events are impossible
/// on the plain HTTP transport and are silently skipped there.
pub fn send_event(
    session: &mut ClientSession,
    name: &str,
    buffer_id: i64,
    body_type: Option<&str>,
    body: Option<Value>,
) {
    if session.websocket != WsStatus::Ready {
        return;
    }
    let envelope = WsEvent {
        code: 0,
        message: name.to_owned(),
        event_name: name.to_owned(),
        buffer_id,
        body_type: body_type.map(ToOwned::to_owned),
        body: body.unwrap_or(Value::Null),
    };
    if let Ok(json) = serde_json::to_string(&envelope) {
        session.queue(text_frame(&json));
    }
}

/// Echo fields for the WebSocket response envelope, taken from the
/// request being answered.
fn request_echo(session: &ClientSession) -> (String, Value, Option<String>) {
    match &session.current_request {
        Some(request) => {
            let body = if request.body.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&request.body).unwrap_or(Value::Null)
            };
            (request.request_line(), body, request.id.clone())
        }
        None => (String::new(), Value::Null, None),
    }
}
