// relay-protocol: wire types and serialization for the "api" relay
// protocol.
//
// Every JSON shape exchanged with clients lives here. HTTP responses
// carry the bare body; WebSocket traffic wraps the same bodies in the
// response/event envelopes below.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Version of the api protocol itself (independent of the application
/// version).
pub const API_VERSION: &str = "0.1.0";
pub const API_VERSION_NUMBER: i64 = 65792;

// ---------------------------------------------------------------------------
// Color rendering modes
// ---------------------------------------------------------------------------

/// How color codes embedded in strings are rendered on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Internal color codes converted to ANSI SGR sequences.
    Ansi,
    /// Internal color codes passed through unchanged.
    Weechat,
    /// Color codes removed.
    Strip,
}

impl ColorMode {
    /// Parses the wire selector; anything unknown falls back to ANSI.
    pub fn from_selector(s: &str) -> Self {
        match s {
            "weechat" => Self::Weechat,
            "strip" => Self::Strip,
            _ => Self::Ansi,
        }
    }
}

impl Default for ColorMode {
    fn default() -> Self {
        Self::Ansi
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Wire timestamp: ISO-8601 UTC with microsecond precision.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferKind {
    Formatted,
    Free,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferKey {
    pub key: String,
    pub command: String,
}

/// A buffer as returned by `/api/buffers` and buffer events.
///
/// `lines` and `nicklist_root` are present only when the request (or
/// the triggering event) asked for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferData {
    pub id: i64,
    /// Full name, `plugin.name`.
    pub name: String,
    pub short_name: String,
    pub number: i32,
    #[serde(rename = "type")]
    pub kind: BufferKind,
    pub hidden: bool,
    pub title: String,
    pub modes: String,
    pub input_prompt: String,
    pub input: String,
    pub input_position: i32,
    pub input_multiline: bool,
    pub nicklist: bool,
    pub nicklist_case_sensitive: bool,
    pub nicklist_display_groups: bool,
    pub time_displayed: bool,
    pub local_variables: std::collections::BTreeMap<String, String>,
    pub keys: Vec<BufferKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<LineData>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nicklist_root: Option<NickGroup>,
}

/// One printed line of a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineData {
    pub id: i64,
    pub y: i32,
    pub date: String,
    pub date_printed: String,
    pub displayed: bool,
    pub highlight: bool,
    pub notify_level: i32,
    pub prefix: String,
    pub message: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nick {
    pub id: i64,
    /// -1 when owned by the root group.
    pub parent_group_id: i64,
    pub prefix: String,
    pub prefix_color_name: String,
    pub prefix_color: String,
    pub name: String,
    pub color_name: String,
    pub color: String,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NickGroup {
    pub id: i64,
    pub parent_group_id: i64,
    pub name: String,
    pub color_name: String,
    pub color: String,
    pub visible: bool,
    pub groups: Vec<NickGroup>,
    pub nicks: Vec<Nick>,
}

/// One hotlist entry. `count` holds, in order, the low / message /
/// private / highlight occurrence counts since the last clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotlistEntry {
    pub priority: u8,
    pub date: String,
    pub buffer_id: i64,
    pub count: [i64; 4],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionData {
    /// One of "null", "command", "command_arg", "auto".
    pub context: String,
    pub base_word: String,
    pub position_replace: i32,
    pub add_space: bool,
    pub list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionData {
    pub weechat_version: String,
    pub weechat_version_git: String,
    pub weechat_version_number: i64,
    pub relay_api_version: String,
    pub relay_api_version_number: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeData {
    /// Strongest mutually supported algorithm, or null when none.
    pub password_hash_algo: Option<String>,
    pub password_hash_iterations: u32,
    pub totp: bool,
}

/// Body of the JSON error responses (`{"error": "..."}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// ---------------------------------------------------------------------------
// WebSocket envelopes
// ---------------------------------------------------------------------------

/// Request sent by a client over an established WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsRequest {
    /// `"<METHOD> <PATH>"`, e.g. `"POST /api/input"`.
    pub request: String,
    /// Opaque correlation id, echoed back in the response envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// Response to a [`WsRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsResponse {
    pub code: u16,
    pub message: String,
    pub request: String,
    pub request_body: serde_json::Value,
    pub request_id: Option<String>,
    pub body_type: Option<String>,
    pub body: serde_json::Value,
}

/// Unsolicited event pushed to synchronized WebSocket clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsEvent {
    /// Always 0 for events.
    pub code: u16,
    pub message: String,
    pub event_name: String,
    /// -1 when the event is not tied to a buffer.
    pub buffer_id: i64,
    pub body_type: Option<String>,
    pub body: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn api_version_literals() {
        assert_eq!(API_VERSION, "0.1.0");
        assert_eq!(API_VERSION_NUMBER, 65792);
    }

    #[test]
    fn timestamp_format_has_microseconds_utc() {
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 5).unwrap()
            + chrono::Duration::microseconds(123_456);
        assert_eq!(format_timestamp(t), "2024-01-15T08:30:05.123456Z");
    }

    #[test]
    fn color_mode_selector_defaults_to_ansi() {
        assert_eq!(ColorMode::from_selector("weechat"), ColorMode::Weechat);
        assert_eq!(ColorMode::from_selector("strip"), ColorMode::Strip);
        assert_eq!(ColorMode::from_selector("ansi"), ColorMode::Ansi);
        assert_eq!(ColorMode::from_selector("bogus"), ColorMode::Ansi);
    }

    #[test]
    fn buffer_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&BufferKind::Formatted).unwrap(),
            "\"formatted\""
        );
        assert_eq!(serde_json::to_string(&BufferKind::Free).unwrap(), "\"free\"");
    }

    #[test]
    fn ws_request_parses_minimal_and_full_forms() {
        let minimal: WsRequest = serde_json::from_str(r#"{"request":"GET /api/version"}"#).unwrap();
        assert_eq!(minimal.request, "GET /api/version");
        assert_eq!(minimal.request_id, None);
        assert_eq!(minimal.body, None);

        let full: WsRequest = serde_json::from_str(
            r#"{"request":"POST /api/ping","request_id":"r1","body":{"data":"x"}}"#,
        )
        .unwrap();
        assert_eq!(full.request_id.as_deref(), Some("r1"));
        assert_eq!(full.body.unwrap()["data"], "x");
    }

    #[test]
    fn ws_response_envelope_serializes_nulls_explicitly() {
        let response = WsResponse {
            code: 204,
            message: "No Content".to_owned(),
            request: "POST /api/sync".to_owned(),
            request_body: serde_json::json!({"sync": false}),
            request_id: None,
            body_type: None,
            body: serde_json::Value::Null,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["request_id"], serde_json::Value::Null);
        assert_eq!(json["body_type"], serde_json::Value::Null);
        assert_eq!(json["body"], serde_json::Value::Null);
        assert_eq!(json["request_body"]["sync"], false);
    }

    #[test]
    fn handshake_null_algo_round_trips() {
        let handshake = HandshakeData {
            password_hash_algo: None,
            password_hash_iterations: 100_000,
            totp: false,
        };
        let json = serde_json::to_value(&handshake).unwrap();
        assert_eq!(json["password_hash_algo"], serde_json::Value::Null);
        let back: HandshakeData = serde_json::from_value(json).unwrap();
        assert_eq!(back, handshake);
    }

    #[test]
    fn hotlist_count_is_fixed_size_array() {
        let entry = HotlistEntry {
            priority: 3,
            date: "2024-01-15T08:30:05.000000Z".to_owned(),
            buffer_id: 2,
            count: [1, 2, 3, 4],
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["count"], serde_json::json!([1, 2, 3, 4]));
    }
}
