use base64::Engine;
use relay_core::{Config, Host};
use relay_protocol::BufferKind;
use relay_test_utils::ws_client::{ServerFrame, WsClient};
use relayd::{listener, ServerState};
use std::net::SocketAddr;

async fn start_server(password: &str) -> (SocketAddr, Host) {
    let mut config = Config::default();
    config.network.password = password.to_owned();
    let host = Host::new(config);
    let state = ServerState::new(host.clone());
    let listener_tcp = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener_tcp.local_addr().unwrap();
    tokio::spawn(listener::serve_tcp(state, listener_tcp));
    (addr, host)
}

fn auth_header(password: &str) -> String {
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(format!("plain:{password}"))
    )
}

#[tokio::test]
async fn upgrade_computes_the_rfc_accept_key() {
    let (addr, _host) = start_server("pw").await;
    // WsClient asserts the accept key matches the RFC computation
    let _client = WsClient::connect(addr, "/api", &[]).await;
}

#[tokio::test]
async fn ping_frame_gets_pong_with_same_payload() {
    let (addr, _host) = start_server("pw").await;
    let mut client = WsClient::connect(addr, "/api", &[]).await;
    client.send_ping(b"abc").await;
    assert_eq!(client.recv_frame().await, ServerFrame::Pong(b"abc".to_vec()));
}

#[tokio::test]
async fn close_frame_is_echoed() {
    let (addr, _host) = start_server("pw").await;
    let mut client = WsClient::connect(addr, "/api", &[]).await;
    client.send_close().await;
    assert!(matches!(client.recv_frame().await, ServerFrame::Close(_)));
}

#[tokio::test]
async fn ws_request_without_auth_gets_401_envelope() {
    let (addr, _host) = start_server("pw").await;
    let mut client = WsClient::connect(addr, "/api", &[]).await;
    client.send_text(r#"{"request": "GET /api/version"}"#).await;
    let response = client.recv_json().await;
    assert_eq!(response["code"], 401);
    assert_eq!(response["body"]["error"], "Missing password");
}

#[tokio::test]
async fn ws_auth_uses_the_upgrade_request_headers() {
    let (addr, _host) = start_server("pw").await;
    let auth = auth_header("pw");
    let mut client = WsClient::connect(addr, "/api", &[("Authorization", &auth)]).await;
    client
        .send_text(r#"{"request": "GET /api/version", "request_id": "v1"}"#)
        .await;
    let response = client.recv_json().await;
    assert_eq!(response["code"], 200);
    assert_eq!(response["request"], "GET /api/version");
    assert_eq!(response["request_id"], "v1");
    assert_eq!(response["body_type"], "version");
    assert_eq!(response["body"]["relay_api_version"], "0.1.0");
}

#[tokio::test]
async fn sync_toggle_envelope_matches_contract() {
    let (addr, _host) = start_server("pw").await;
    let auth = auth_header("pw");
    let mut client = WsClient::connect(addr, "/api", &[("Authorization", &auth)]).await;

    client
        .send_text(r#"{"request":"POST /api/sync","body":{"sync":false}}"#)
        .await;
    let response = client.recv_json().await;
    assert_eq!(
        response,
        serde_json::json!({
            "code": 204,
            "message": "No Content",
            "request": "POST /api/sync",
            "request_body": {"sync": false},
            "request_id": null,
            "body_type": null,
            "body": null
        })
    );
}

#[tokio::test]
async fn malformed_ws_envelope_gets_400() {
    let (addr, _host) = start_server("pw").await;
    let mut client = WsClient::connect(addr, "/api", &[]).await;
    client.send_text("{not json").await;
    let response = client.recv_json().await;
    assert_eq!(response["code"], 400);

    client.send_text(r#"{"request": "nospace"}"#).await;
    let response = client.recv_json().await;
    assert_eq!(response["code"], 400);
}

#[tokio::test]
async fn events_arrive_in_host_order_after_sync() {
    let (addr, host) = start_server("pw").await;
    let auth = auth_header("pw");
    let mut client = WsClient::connect(addr, "/api", &[("Authorization", &auth)]).await;

    client.send_text(r#"{"request":"POST /api/sync"}"#).await;
    let response = client.recv_json().await;
    assert_eq!(response["code"], 204);

    // three host actions -> three events, in order
    let opened = host.buffer_add("irc.libera.#events", BufferKind::Formatted);
    let main = host.main_buffer_id().unwrap();
    host.print(main, "", "first line");
    host.buffer_set_title(main, "new title");

    let event = client.recv_json().await;
    assert_eq!(event["code"], 0);
    assert_eq!(event["event_name"], "buffer_opened");
    assert_eq!(event["message"], "buffer_opened");
    assert_eq!(event["buffer_id"], opened);
    assert_eq!(event["body_type"], "buffer");
    assert_eq!(event["body"]["name"], "irc.libera.#events");
    // opened buffers are sent complete, with lines and nicklist
    assert!(event["body"]["lines"].is_array());

    let event = client.recv_json().await;
    assert_eq!(event["event_name"], "buffer_line_added");
    assert_eq!(event["buffer_id"], main);
    assert_eq!(event["body_type"], "line");
    assert_eq!(event["body"]["message"], "first line");

    let event = client.recv_json().await;
    assert_eq!(event["event_name"], "buffer_title_changed");
    assert_eq!(event["body_type"], "buffer");
    assert_eq!(event["body"]["title"], "new title");
    // non-opened buffer events omit lines and nicks
    assert!(event["body"].get("lines").is_none());
}

#[tokio::test]
async fn buffer_closed_event_reports_the_recorded_id() {
    let (addr, host) = start_server("pw").await;
    let auth = auth_header("pw");
    let mut client = WsClient::connect(addr, "/api", &[("Authorization", &auth)]).await;

    client.send_text(r#"{"request":"POST /api/sync"}"#).await;
    assert_eq!(client.recv_json().await["code"], 204);

    let buffer = host.buffer_add("irc.libera.#closing", BufferKind::Formatted);
    assert_eq!(client.recv_json().await["event_name"], "buffer_opened");

    host.buffer_close(buffer);
    // buffer_closing itself is not emitted; the next event is
    // buffer_closed carrying the id captured at closing time
    let event = client.recv_json().await;
    assert_eq!(event["event_name"], "buffer_closed");
    assert_eq!(event["buffer_id"], buffer);
    assert_eq!(event["body_type"], serde_json::Value::Null);
    assert_eq!(event["body"], serde_json::Value::Null);
}

#[tokio::test]
async fn sync_disabled_stops_events() {
    let (addr, host) = start_server("pw").await;
    let auth = auth_header("pw");
    let mut client = WsClient::connect(addr, "/api", &[("Authorization", &auth)]).await;

    client.send_text(r#"{"request":"POST /api/sync","body":{"sync":false}}"#).await;
    assert_eq!(client.recv_json().await["code"], 204);

    host.buffer_add("irc.libera.#quiet", BufferKind::Formatted);

    // no event may arrive; a follow-up request's response must be next
    client.send_text(r#"{"request":"POST /api/ping","body":{"data":"x"}}"#).await;
    let response = client.recv_json().await;
    assert_eq!(response["code"], 200);
    assert_eq!(response["body"]["data"], "x");
}

#[tokio::test]
async fn sync_nicks_false_filters_nicklist_events() {
    let (addr, host) = start_server("pw").await;
    let auth = auth_header("pw");
    let mut client = WsClient::connect(addr, "/api", &[("Authorization", &auth)]).await;

    client
        .send_text(r#"{"request":"POST /api/sync","body":{"nicks":false}}"#)
        .await;
    assert_eq!(client.recv_json().await["code"], 204);

    let buffer = host.buffer_add("irc.libera.#nicks", BufferKind::Formatted);
    assert_eq!(client.recv_json().await["event_name"], "buffer_opened");

    host.nicklist_add_nick(buffer, None, "alice", "green", "", "", true);
    // the nick event is filtered; the next observable event is the
    // title change below
    host.buffer_set_title(buffer, "t");
    let event = client.recv_json().await;
    assert_eq!(event["event_name"], "buffer_title_changed");
}

#[tokio::test]
async fn nicklist_events_carry_nick_bodies() {
    let (addr, host) = start_server("pw").await;
    let auth = auth_header("pw");
    let mut client = WsClient::connect(addr, "/api", &[("Authorization", &auth)]).await;

    client.send_text(r#"{"request":"POST /api/sync"}"#).await;
    assert_eq!(client.recv_json().await["code"], 204);

    let buffer = host.buffer_add("irc.libera.#n", BufferKind::Formatted);
    assert_eq!(client.recv_json().await["event_name"], "buffer_opened");

    let nick = host
        .nicklist_add_nick(buffer, None, "alice", "green", "@", "lightgreen", true)
        .unwrap();
    let event = client.recv_json().await;
    assert_eq!(event["event_name"], "nicklist_nick_added");
    assert_eq!(event["body_type"], "nick");
    assert_eq!(event["body"]["id"], nick);
    assert_eq!(event["body"]["name"], "alice");

    host.nicklist_remove_nick(buffer, nick);
    let event = client.recv_json().await;
    assert_eq!(event["event_name"], "nicklist_nick_removing");
    assert_eq!(event["body"]["id"], nick);
}

#[tokio::test]
async fn input_over_ws_executes_command() {
    let (addr, host) = start_server("pw").await;
    let auth = auth_header("pw");
    let mut client = WsClient::connect(addr, "/api", &[("Authorization", &auth)]).await;

    client
        .send_text(r#"{"request":"POST /api/input","body":{"command":"/print hello"}}"#)
        .await;
    let response = client.recv_json().await;
    assert_eq!(response["code"], 204);
    assert_eq!(response["request_body"]["command"], "/print hello");

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let main = host.main_buffer_id().unwrap();
    let last = host
        .with_buffer(main, |b| b.lines.last().map(|l| l.message.clone()))
        .unwrap();
    assert_eq!(last.as_deref(), Some("hello"));
}

#[tokio::test]
async fn upgrade_signals_reach_synced_clients() {
    let (addr, host) = start_server("pw").await;
    let auth = auth_header("pw");
    let mut client = WsClient::connect(addr, "/api", &[("Authorization", &auth)]).await;

    client.send_text(r#"{"request":"POST /api/sync"}"#).await;
    assert_eq!(client.recv_json().await["code"], 204);

    host.upgrade();
    let event = client.recv_json().await;
    assert_eq!(event["event_name"], "upgrade");
    assert_eq!(event["buffer_id"], -1);
    assert_eq!(event["body"], serde_json::Value::Null);
    let event = client.recv_json().await;
    assert_eq!(event["event_name"], "upgrade_ended");
}
