//! HTTP request framing and response encoding on raw sockets.
//!
//! Requests accumulate in the client's partial buffer until the blank
//! line, are head-parsed with httparse, then the declared body length
//! is awaited. Responses are built here with the CORS and content
//! headers every api reply carries.

use std::collections::HashMap;

/// Maximum accepted head + body size; anything larger is a client
/// error, not a capacity error.
pub const MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;

const MAX_HEADERS: usize = 64;

#[derive(Debug, Default, Clone)]
pub struct HttpRequest {
    pub method: String,
    /// Path without the query string.
    pub path: String,
    /// Path split on `/`, empty items removed.
    pub path_items: Vec<String>,
    /// Decoded query parameters.
    pub params: HashMap<String, String>,
    /// Header map, keys lowercased; repeated cookie headers are
    /// joined with `; `, other repeats with `, `.
    pub headers: HashMap<String, String>,
    pub content_length: usize,
    pub body: Vec<u8>,
    /// Correlation id supplied by WebSocket clients.
    pub id: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Head not complete yet, keep reading.
    Incomplete,
    /// Head parsed, `consumed` bytes of input used; body may still be
    /// pending.
    Parsed { consumed: usize },
    /// Malformed request.
    Invalid,
}

impl HttpRequest {
    /// Parses the request head from `data` (everything up to and
    /// including the blank line).
    pub fn parse_head(data: &[u8]) -> (ParseOutcome, Option<Self>) {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut headers);
        match parsed.parse(data) {
            Ok(httparse::Status::Complete(consumed)) => {
                let (Some(method), Some(target)) = (parsed.method, parsed.path) else {
                    return (ParseOutcome::Invalid, None);
                };
                let mut request = Self {
                    method: method.to_owned(),
                    ..Self::default()
                };
                request.set_target(target);
                for header in parsed.headers {
                    let name = header.name.to_lowercase();
                    let value = String::from_utf8_lossy(header.value).trim().to_owned();
                    request.insert_header(&name, value);
                }
                request.content_length = request
                    .header("content-length")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                (ParseOutcome::Parsed { consumed }, Some(request))
            }
            Ok(httparse::Status::Partial) => (ParseOutcome::Incomplete, None),
            Err(_) => (ParseOutcome::Invalid, None),
        }
    }

    /// Fills method/path from a `"<METHOD> <PATH>"` line (WebSocket
    /// request envelopes).
    pub fn parse_method_path(&mut self, line: &str) -> bool {
        let mut parts = line.splitn(2, ' ');
        let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
            return false;
        };
        if method.is_empty() || target.is_empty() {
            return false;
        }
        self.method = method.to_owned();
        self.set_target(target);
        true
    }

    fn set_target(&mut self, target: &str) {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };
        self.path = path.to_owned();
        self.path_items = path
            .split('/')
            .filter(|item| !item.is_empty())
            .map(ToOwned::to_owned)
            .collect();
        if let Some(query) = query {
            for pair in query.split('&') {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                self.params
                    .insert(url_decode(key), url_decode(value));
            }
        }
    }

    fn insert_header(&mut self, name: &str, value: String) {
        match self.headers.get_mut(name) {
            Some(existing) => {
                let separator = if name == "cookie" || name == "set-cookie" {
                    "; "
                } else {
                    ", "
                };
                existing.push_str(separator);
                existing.push_str(&value);
            }
            None => {
                self.headers.insert(name.to_owned(), value);
            }
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn param_i64(&self, name: &str, default: i64) -> i64 {
        self.param(name)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    pub fn param_bool(&self, name: &str, default: bool) -> bool {
        match self.param(name) {
            Some(value) => matches!(value, "1" | "true" | "on" | "yes"),
            None => default,
        }
    }

    /// `"<METHOD> <PATH>"`, as echoed in WebSocket envelopes.
    pub fn request_line(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// True when the head asks to switch to the WebSocket protocol.
    pub fn is_websocket_upgrade(&self) -> bool {
        self.header("upgrade")
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
            && self
                .header("connection")
                .is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"))
            && self.header("sec-websocket-version") == Some("13")
            && self.header("sec-websocket-key").is_some()
    }
}

fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let digits = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                if let Ok(value) = u8::from_str_radix(digits, 16) {
                    out.push(value);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

pub fn status_message(code: u16) -> &'static str {
    match code {
        101 => "Switching Protocols",
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}

/// Builds a complete HTTP response with the standard api headers.
/// `204` responses never carry a body.
pub fn http_response(code: u16, extra_headers: Option<&str>, body: Option<&str>) -> Vec<u8> {
    let body = if code == 204 { None } else { body };
    let body_bytes = body.map_or(&[][..], str::as_bytes);
    let mut out = format!("HTTP/1.1 {} {}\r\n", code, status_message(code));
    out.push_str("Access-Control-Allow-Origin: *\r\n");
    out.push_str("Content-Type: application/json; charset=utf-8\r\n");
    if let Some(extra) = extra_headers {
        out.push_str(extra);
        if !extra.ends_with("\r\n") {
            out.push_str("\r\n");
        }
    }
    out.push_str(&format!("Content-Length: {}\r\n\r\n", body_bytes.len()));
    let mut bytes = out.into_bytes();
    bytes.extend_from_slice(body_bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> HttpRequest {
        let (outcome, request) = HttpRequest::parse_head(raw.as_bytes());
        assert!(matches!(outcome, ParseOutcome::Parsed { .. }));
        request.unwrap()
    }

    #[test]
    fn parses_request_line_path_items_and_query() {
        let request = parse(
            "GET /api/buffers/core.weechat/lines?lines=-10&colors=strip HTTP/1.1\r\nHost: x\r\n\r\n",
        );
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/api/buffers/core.weechat/lines");
        assert_eq!(
            request.path_items,
            vec!["api", "buffers", "core.weechat", "lines"]
        );
        assert_eq!(request.param_i64("lines", 0), -10);
        assert_eq!(request.param("colors"), Some("strip"));
    }

    #[test]
    fn incomplete_head_reports_incomplete() {
        let (outcome, _) = HttpRequest::parse_head(b"GET /api/version HTTP/1.1\r\nHost:");
        assert_eq!(outcome, ParseOutcome::Incomplete);
    }

    #[test]
    fn malformed_head_reports_invalid() {
        let (outcome, _) = HttpRequest::parse_head(b"\0\0garbage\r\n\r\n");
        assert_eq!(outcome, ParseOutcome::Invalid);
    }

    #[test]
    fn header_keys_are_case_insensitive_and_cookies_join() {
        let request = parse(
            "GET / HTTP/1.1\r\nCookie: a=1\r\nCOOKIE: b=2\r\nAccept: x\r\nAccept: y\r\n\r\n",
        );
        assert_eq!(request.header("cookie"), Some("a=1; b=2"));
        assert_eq!(request.header("accept"), Some("x, y"));
    }

    #[test]
    fn content_length_is_extracted() {
        let request = parse("POST /api/input HTTP/1.1\r\nContent-Length: 42\r\n\r\n");
        assert_eq!(request.content_length, 42);
    }

    #[test]
    fn websocket_upgrade_detection() {
        let request = parse(
            "GET /api HTTP/1.1\r\nUpgrade: websocket\r\nConnection: keep-alive, Upgrade\r\n\
             Sec-WebSocket-Version: 13\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        );
        assert!(request.is_websocket_upgrade());
        let request = parse("GET /api HTTP/1.1\r\nUpgrade: websocket\r\n\r\n");
        assert!(!request.is_websocket_upgrade());
    }

    #[test]
    fn method_path_line_parsing() {
        let mut request = HttpRequest::default();
        assert!(request.parse_method_path("POST /api/input"));
        assert_eq!(request.method, "POST");
        assert_eq!(request.path_items, vec!["api", "input"]);
        assert!(!HttpRequest::default().parse_method_path("nospace"));
    }

    #[test]
    fn url_decoding_in_params() {
        let request = parse("GET /api/ping?totp=12%2034+5 HTTP/1.1\r\n\r\n");
        assert_eq!(request.param("totp"), Some("12 34 5"));
    }

    #[test]
    fn response_carries_cors_and_length() {
        let bytes = http_response(200, None, Some("{\"a\":1}"));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(text.contains("Content-Type: application/json; charset=utf-8\r\n"));
        assert!(text.contains("Content-Length: 7\r\n"));
        assert!(text.ends_with("{\"a\":1}"));
    }

    #[test]
    fn no_content_has_zero_length_and_no_body() {
        let bytes = http_response(204, None, Some("ignored"));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(text.ends_with("Content-Length: 0\r\n\r\n"));
    }

    #[test]
    fn extra_headers_are_inserted() {
        let bytes = http_response(204, Some("Access-Control-Allow-Methods: GET, POST"), None);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Access-Control-Allow-Methods: GET, POST\r\n"));
    }
}
