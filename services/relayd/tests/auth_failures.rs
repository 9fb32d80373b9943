use base64::Engine;
use relay_core::{Config, Host};
use relay_test_utils::http_request;
use relayd::auth::totp_value;
use relayd::{listener, ServerState};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

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

fn basic(credentials: &str) -> String {
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(credentials)
    )
}

#[tokio::test]
async fn wrong_password_gets_invalid_password() {
    let (addr, _host) = start_server(config_with_password("right")).await;
    let response = http_request(
        addr,
        "GET",
        "/api/version",
        &[("Authorization", &basic("plain:wrong"))],
        None,
    )
    .await;
    assert_eq!(response.status, 401);
    assert_eq!(response.json(), serde_json::json!({"error": "Invalid password"}));
}

#[tokio::test]
async fn connection_is_closed_after_auth_failure() {
    let (addr, _host) = start_server(config_with_password("right")).await;
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /api/version HTTP/1.1\r\nHost: x\r\n\r\n")
        .await
        .unwrap();
    // read the 401 then expect EOF: the server replies exactly once
    // and closes after flushing
    let mut data = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
    }
    let text = String::from_utf8_lossy(&data);
    assert!(text.starts_with("HTTP/1.1 401 Unauthorized\r\n"), "{text}");
    assert_eq!(text.matches("401 Unauthorized").count(), 1);
}

#[tokio::test]
async fn password_expression_is_evaluated_at_auth_time() {
    let mut config = config_with_password("${sec.data.relay}");
    config.secure.insert("relay".to_owned(), "hunter2".to_owned());
    let (addr, _host) = start_server(config).await;

    let response = http_request(
        addr,
        "GET",
        "/api/version",
        &[("Authorization", &basic("plain:hunter2"))],
        None,
    )
    .await;
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn sha256_salted_hash_authenticates() {
    let (addr, _host) = start_server(config_with_password("hunter2")).await;
    let salt = b"client-salt";
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(b"hunter2");
    let credentials = format!(
        "hash:sha256:{}:{}",
        hex::encode(salt),
        hex::encode(hasher.finalize())
    );

    let response = http_request(
        addr,
        "GET",
        "/api/version",
        &[("Authorization", &basic(&credentials))],
        None,
    )
    .await;
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn pbkdf2_sha256_hash_authenticates() {
    let (addr, _host) = start_server(config_with_password("hunter2")).await;
    let salt = b"abcd";
    let mut derived = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(b"hunter2", salt, 5000, &mut derived);
    let credentials = format!(
        "hash:pbkdf2+sha256:{}:5000:{}",
        hex::encode(salt),
        hex::encode(derived)
    );

    let response = http_request(
        addr,
        "GET",
        "/api/version",
        &[("Authorization", &basic(&credentials))],
        None,
    )
    .await;
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn hash_algo_outside_allow_list_is_rejected() {
    let mut config = config_with_password("hunter2");
    config.network.password_hash_algo = vec!["pbkdf2+sha512".to_owned()];
    let (addr, _host) = start_server(config).await;

    let salt = b"s";
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(b"hunter2");
    let credentials = format!(
        "hash:sha256:{}:{}",
        hex::encode(salt),
        hex::encode(hasher.finalize())
    );
    let response = http_request(
        addr,
        "GET",
        "/api/version",
        &[("Authorization", &basic(&credentials))],
        None,
    )
    .await;
    assert_eq!(response.status, 401);
}

#[tokio::test]
async fn totp_is_required_and_checked_when_configured() {
    let secret_bytes = b"12345678901234567890";
    let secret_b32 = relay_text::base_encode(relay_text::Base::Base32, secret_bytes);
    let mut config = config_with_password("pw");
    config.network.totp_secret = secret_b32;
    let (addr, _host) = start_server(config).await;

    // missing TOTP parameter
    let response = http_request(
        addr,
        "GET",
        "/api/version",
        &[("Authorization", &basic("plain:pw"))],
        None,
    )
    .await;
    assert_eq!(response.status, 401);
    assert_eq!(response.json(), serde_json::json!({"error": "Missing TOTP"}));

    // wrong TOTP value
    let response = http_request(
        addr,
        "GET",
        "/api/version?totp=000001",
        &[("Authorization", &basic("plain:pw"))],
        None,
    )
    .await;
    assert_eq!(response.status, 401);

    // current TOTP value passes
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let value = totp_value(secret_bytes, now / 30);
    let response = http_request(
        addr,
        "GET",
        &format!("/api/version?totp={value}"),
        &[("Authorization", &basic("plain:pw"))],
        None,
    )
    .await;
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn handshake_reports_totp_requirement() {
    let mut config = config_with_password("pw");
    config.network.totp_secret = "JBSWY3DPEHPK3PXP".to_owned();
    let (addr, _host) = start_server(config).await;

    let response = http_request(addr, "POST", "/api/handshake", &[], Some("{}")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.json()["totp"], true);
}
