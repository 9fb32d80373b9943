use base64::Engine;
use relay_core::{Config, Host};
use relay_protocol::BufferKind;
use relay_test_utils::http_request;
use relayd::{listener, ServerState};
use std::net::SocketAddr;

async fn start_server(config: Config) -> (SocketAddr, Host) {
    let host = Host::new(config);
    let state = ServerState::new(host.clone());
    let listener_tcp = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener_tcp.local_addr().unwrap();
    tokio::spawn(listener::serve_tcp(state, listener_tcp));
    (addr, host)
}

fn config_with_password(password: &str) -> Config {
    let mut config = Config::default();
    config.network.password = password.to_owned();
    config
}

fn auth_header(password: &str) -> String {
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(format!("plain:{password}"))
    )
}

#[tokio::test]
async fn handshake_negotiates_strongest_common_algo() {
    let mut config = config_with_password("s3cret");
    config.network.password_hash_algo =
        vec!["pbkdf2+sha256".to_owned(), "pbkdf2+sha512".to_owned()];
    let (addr, _host) = start_server(config).await;

    let response = http_request(
        addr,
        "POST",
        "/api/handshake",
        &[],
        Some(r#"{"password_hash_algo": ["sha256", "pbkdf2+sha512"]}"#),
    )
    .await;
    assert_eq!(response.status, 200);
    assert_eq!(
        response.json(),
        serde_json::json!({
            "password_hash_algo": "pbkdf2+sha512",
            "password_hash_iterations": 100_000,
            "totp": false
        })
    );
}

#[tokio::test]
async fn handshake_with_no_common_algo_returns_null() {
    let mut config = config_with_password("s3cret");
    config.network.password_hash_algo = vec!["sha512".to_owned()];
    let (addr, _host) = start_server(config).await;

    let response = http_request(
        addr,
        "POST",
        "/api/handshake",
        &[],
        Some(r#"{"password_hash_algo": ["sha256"]}"#),
    )
    .await;
    assert_eq!(response.status, 200);
    assert_eq!(response.json()["password_hash_algo"], serde_json::Value::Null);
}

#[tokio::test]
async fn version_returns_api_literals_with_valid_auth() {
    let (addr, _host) = start_server(config_with_password("s3cret")).await;

    let response = http_request(
        addr,
        "GET",
        "/api/version",
        &[("Authorization", &auth_header("s3cret"))],
        None,
    )
    .await;
    assert_eq!(response.status, 200);
    let json = response.json();
    assert_eq!(json["relay_api_version"], "0.1.0");
    assert_eq!(json["relay_api_version_number"], 65792);
    assert!(json["weechat_version"].is_string());
}

#[tokio::test]
async fn missing_password_is_rejected_with_specific_error() {
    let (addr, _host) = start_server(config_with_password("s3cret")).await;

    let response = http_request(addr, "GET", "/api/version", &[], None).await;
    assert_eq!(response.status, 401);
    assert_eq!(response.json(), serde_json::json!({"error": "Missing password"}));
}

#[tokio::test]
async fn responses_carry_cors_header() {
    let (addr, _host) = start_server(config_with_password("s3cret")).await;
    let response = http_request(addr, "GET", "/api/version", &[], None).await;
    assert_eq!(
        response.headers.get("access-control-allow-origin").map(String::as_str),
        Some("*")
    );
}

#[tokio::test]
async fn options_preflight_lists_methods_and_headers() {
    let (addr, _host) = start_server(config_with_password("s3cret")).await;

    let response = http_request(addr, "OPTIONS", "/api/anything", &[], None).await;
    assert_eq!(response.status, 204);
    assert_eq!(
        response
            .headers
            .get("access-control-allow-methods")
            .map(String::as_str),
        Some("GET, POST, PUT, DELETE")
    );
    assert_eq!(
        response
            .headers
            .get("access-control-allow-headers")
            .map(String::as_str),
        Some("origin, content-type, accept, authorization")
    );
    assert_eq!(response.body, "");
}

#[tokio::test]
async fn unknown_route_and_bad_arg_count_are_not_found() {
    let (addr, _host) = start_server(config_with_password("s3cret")).await;
    let auth = auth_header("s3cret");

    let response = http_request(
        addr,
        "GET",
        "/api/nonexistent",
        &[("Authorization", &auth)],
        None,
    )
    .await;
    assert_eq!(response.status, 404);

    // version takes no path arguments
    let response = http_request(
        addr,
        "GET",
        "/api/version/extra",
        &[("Authorization", &auth)],
        None,
    )
    .await;
    assert_eq!(response.status, 404);

    // not under /api at all
    let response = http_request(addr, "GET", "/other", &[("Authorization", &auth)], None).await;
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn unknown_buffer_renders_the_exact_error_message() {
    let (addr, _host) = start_server(config_with_password("s3cret")).await;

    let response = http_request(
        addr,
        "GET",
        "/api/buffers/invalid",
        &[("Authorization", &auth_header("s3cret"))],
        None,
    )
    .await;
    assert_eq!(response.status, 404);
    assert_eq!(
        response.json(),
        serde_json::json!({"error": "Buffer \"invalid\" not found"})
    );
}

#[tokio::test]
async fn buffers_collection_lists_buffers_without_lines() {
    let (addr, host) = start_server(config_with_password("s3cret")).await;
    host.buffer_add("irc.libera.#rust", BufferKind::Formatted);

    let response = http_request(
        addr,
        "GET",
        "/api/buffers",
        &[("Authorization", &auth_header("s3cret"))],
        None,
    )
    .await;
    assert_eq!(response.status, 200);
    let json = response.json();
    let buffers = json.as_array().unwrap();
    assert_eq!(buffers.len(), 2);
    assert_eq!(buffers[0]["name"], "core.weechat");
    assert_eq!(buffers[1]["name"], "irc.libera.#rust");
    assert!(buffers[0].get("lines").is_none());
}

#[tokio::test]
async fn lines_negative_selection_returns_tail_in_forward_order() {
    let (addr, host) = start_server(config_with_password("s3cret")).await;
    let buffer = host.main_buffer_id().unwrap();
    for i in 0..5 {
        host.print(buffer, "", &format!("message {i}"));
    }

    let response = http_request(
        addr,
        "GET",
        "/api/buffers/core.weechat/lines?lines=-2&colors=strip",
        &[("Authorization", &auth_header("s3cret"))],
        None,
    )
    .await;
    assert_eq!(response.status, 200);
    let json = response.json();
    let lines = json.as_array().unwrap();
    let messages: Vec<&str> = lines.iter().map(|l| l["message"].as_str().unwrap()).collect();
    assert_eq!(messages, vec!["message 3", "message 4"]);
}

#[tokio::test]
async fn lines_larger_negative_selection_returns_all() {
    let (addr, host) = start_server(config_with_password("s3cret")).await;
    let buffer = host.main_buffer_id().unwrap();
    for i in 0..3 {
        host.print(buffer, "", &format!("m{i}"));
    }

    let response = http_request(
        addr,
        "GET",
        "/api/buffers/core.weechat/lines?lines=-10",
        &[("Authorization", &auth_header("s3cret"))],
        None,
    )
    .await;
    assert_eq!(response.json().as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn buffer_by_id_with_lines_and_nicks() {
    let (addr, host) = start_server(config_with_password("s3cret")).await;
    let buffer = host.buffer_add("irc.libera.#rust", BufferKind::Formatted);
    host.print(buffer, "", "hello");
    host.nicklist_add_nick(buffer, None, "alice", "green", "@", "lightgreen", true);

    let response = http_request(
        addr,
        "GET",
        &format!("/api/buffers/{buffer}?lines=-1&nicks=true&colors=strip"),
        &[("Authorization", &auth_header("s3cret"))],
        None,
    )
    .await;
    assert_eq!(response.status, 200);
    let json = response.json();
    assert_eq!(json["id"], buffer);
    assert_eq!(json["lines"].as_array().unwrap().len(), 1);
    assert_eq!(json["nicklist_root"]["nicks"][0]["name"], "alice");
}

#[tokio::test]
async fn unknown_sub_resource_is_not_found() {
    let (addr, _host) = start_server(config_with_password("s3cret")).await;
    let response = http_request(
        addr,
        "GET",
        "/api/buffers/core.weechat/keys",
        &[("Authorization", &auth_header("s3cret"))],
        None,
    )
    .await;
    assert_eq!(response.status, 404);
    assert_eq!(
        response.json(),
        serde_json::json!({"error": "Sub-resource of buffers not found: \"keys\""})
    );
}

#[tokio::test]
async fn hotlist_is_sorted_with_ties_on_buffer_id() {
    let (addr, host) = start_server(config_with_password("s3cret")).await;
    let a = host.buffer_add("irc.libera.#a", BufferKind::Formatted);
    let b = host.buffer_add("irc.libera.#b", BufferKind::Formatted);
    host.hotlist_add(a, 1);
    host.hotlist_add(b, 3);

    let response = http_request(
        addr,
        "GET",
        "/api/hotlist",
        &[("Authorization", &auth_header("s3cret"))],
        None,
    )
    .await;
    assert_eq!(response.status, 200);
    let json = response.json();
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    // group_time_asc: highest priority group first
    assert_eq!(entries[0]["buffer_id"], b);
    assert_eq!(entries[0]["priority"], 3);
    assert_eq!(entries[1]["buffer_id"], a);
}

#[tokio::test]
async fn ping_echoes_data_or_returns_no_content() {
    let (addr, _host) = start_server(config_with_password("s3cret")).await;
    let auth = auth_header("s3cret");

    let response = http_request(
        addr,
        "POST",
        "/api/ping",
        &[("Authorization", &auth)],
        Some(r#"{"data": "1703871600000000"}"#),
    )
    .await;
    assert_eq!(response.status, 200);
    assert_eq!(
        response.json(),
        serde_json::json!({"data": "1703871600000000"})
    );

    let response = http_request(addr, "POST", "/api/ping", &[("Authorization", &auth)], None).await;
    assert_eq!(response.status, 204);
    assert_eq!(response.body, "");
}

#[tokio::test]
async fn input_executes_print_on_the_main_buffer() {
    let (addr, host) = start_server(config_with_password("s3cret")).await;

    let response = http_request(
        addr,
        "POST",
        "/api/input",
        &[("Authorization", &auth_header("s3cret"))],
        Some(r#"{"command": "/print hello"}"#),
    )
    .await;
    assert_eq!(response.status, 204);

    // the command runs on a short timer after the response
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let buffer = host.main_buffer_id().unwrap();
    let last = host
        .with_buffer(buffer, |b| b.lines.last().map(|l| l.message.clone()))
        .unwrap();
    assert_eq!(last.as_deref(), Some("hello"));
}

#[tokio::test]
async fn input_with_malformed_body_is_bad_request() {
    let (addr, _host) = start_server(config_with_password("s3cret")).await;
    let response = http_request(
        addr,
        "POST",
        "/api/input",
        &[("Authorization", &auth_header("s3cret"))],
        Some("{not json"),
    )
    .await;
    assert_eq!(response.status, 400);
}

#[tokio::test]
async fn input_with_unknown_buffer_id_is_not_found() {
    let (addr, _host) = start_server(config_with_password("s3cret")).await;
    let response = http_request(
        addr,
        "POST",
        "/api/input",
        &[("Authorization", &auth_header("s3cret"))],
        Some(r#"{"buffer_id": 99999, "command": "/print x"}"#),
    )
    .await;
    assert_eq!(response.status, 404);
    assert_eq!(
        response.json(),
        serde_json::json!({"error": "Buffer \"99999\" not found"})
    );
}

#[tokio::test]
async fn input_respects_command_allow_list() {
    let mut config = config_with_password("s3cret");
    config.network.commands = "buffer".to_owned();
    let (addr, host) = start_server(config).await;

    let response = http_request(
        addr,
        "POST",
        "/api/input",
        &[("Authorization", &auth_header("s3cret"))],
        Some(r#"{"command": "/print blocked"}"#),
    )
    .await;
    // refusal is host-side only: the client still gets 204
    assert_eq!(response.status, 204);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let buffer = host.main_buffer_id().unwrap();
    assert_eq!(host.with_buffer(buffer, |b| b.lines.len()).unwrap(), 0);
}

#[tokio::test]
async fn completion_returns_command_candidates() {
    let (addr, _host) = start_server(config_with_password("s3cret")).await;

    let response = http_request(
        addr,
        "POST",
        "/api/completion",
        &[("Authorization", &auth_header("s3cret"))],
        Some(r#"{"command": "/cl", "position": 3}"#),
    )
    .await;
    assert_eq!(response.status, 200);
    let json = response.json();
    assert_eq!(json["context"], "command");
    assert_eq!(json["base_word"], "/cl");
    assert_eq!(json["add_space"], true);
    let list: Vec<&str> = json["list"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(list.contains(&"/clear"));
    assert!(list.contains(&"/close"));
}

#[tokio::test]
async fn sync_over_plain_http_is_forbidden() {
    let (addr, _host) = start_server(config_with_password("s3cret")).await;
    let response = http_request(
        addr,
        "POST",
        "/api/sync",
        &[("Authorization", &auth_header("s3cret"))],
        Some("{}"),
    )
    .await;
    assert_eq!(response.status, 403);
    assert_eq!(
        response.json(),
        serde_json::json!({"error": "Sync resource is available only with a websocket connection"})
    );
}
