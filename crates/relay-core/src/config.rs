//! Configuration loading.
//!
//! TOML is the sole config source. All fields are optional and fall
//! back to defaults, except that a present `schema_version` must be 1.
//!
//! The `network.password` and `secure` values may contain `${...}`
//! expressions; they are evaluated where they are used, not at load
//! time.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::hotlist::HotlistSort;
use crate::proxy::{Ipv6Mode, Proxy, ProxyKind};

pub const DEFAULT_HASH_ITERATIONS: u32 = 100_000;
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TLS_HANDSHAKE_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub network: NetworkConfig,
    pub look: LookConfig,
    pub listen: ListenConfig,
    pub proxies: Vec<Proxy>,
    /// Secured data, consumed by `${sec.data.*}` lookups.
    pub secure: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Relay password (expression, evaluated at auth time).
    pub password: String,
    /// Allowed hash algorithms, strongest negotiated wins.
    pub password_hash_algo: Vec<String>,
    pub password_hash_iterations: u32,
    /// TOTP secret, base32 (expression; empty disables TOTP).
    pub totp_secret: String,
    pub connection_timeout_secs: u64,
    pub tls_handshake_timeout_secs: u64,
    /// Allow-list for the input resource, comma-separated command
    /// names; empty allows everything.
    pub commands: String,
}

#[derive(Debug, Clone)]
pub struct LookConfig {
    pub auto_open_buffer: bool,
    pub hotlist_sort: HotlistSort,
}

#[derive(Debug, Clone)]
pub struct ListenConfig {
    pub bind: String,
    pub tls_bind: Option<String>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub unix_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                password: String::new(),
                password_hash_algo: vec![
                    "sha256".to_owned(),
                    "sha512".to_owned(),
                    "pbkdf2+sha256".to_owned(),
                    "pbkdf2+sha512".to_owned(),
                ],
                password_hash_iterations: DEFAULT_HASH_ITERATIONS,
                totp_secret: String::new(),
                connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
                tls_handshake_timeout_secs: DEFAULT_TLS_HANDSHAKE_TIMEOUT_SECS,
                commands: String::new(),
            },
            look: LookConfig {
                auto_open_buffer: true,
                hotlist_sort: HotlistSort::GroupTimeAsc,
            },
            listen: ListenConfig {
                bind: "127.0.0.1:9000".to_owned(),
                tls_bind: None,
                tls_cert: None,
                tls_key: None,
                unix_path: None,
            },
            proxies: Vec::new(),
            secure: HashMap::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (with Option for optional fields)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    network: Option<RawNetworkConfig>,
    look: Option<RawLookConfig>,
    listen: Option<RawListenConfig>,
    proxy: Option<Vec<RawProxyConfig>>,
    secure: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct RawNetworkConfig {
    password: Option<String>,
    password_hash_algo: Option<String>,
    password_hash_iterations: Option<u32>,
    totp_secret: Option<String>,
    connection_timeout: Option<u64>,
    tls_handshake_timeout: Option<u64>,
    commands: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLookConfig {
    auto_open_buffer: Option<bool>,
    hotlist_sort: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawListenConfig {
    bind: Option<String>,
    tls_bind: Option<String>,
    tls_cert: Option<String>,
    tls_key: Option<String>,
    unix_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawProxyConfig {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    ipv6: Option<String>,
    address: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn load_config_from_path(path: &Path) -> Result<Config, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    if let Some(version) = raw.schema_version {
        if version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported schema_version {version} (expected 1)"
            )));
        }
    }

    let mut config = Config::default();

    if let Some(network) = raw.network {
        if let Some(password) = network.password {
            config.network.password = password;
        }
        if let Some(algos) = network.password_hash_algo {
            config.network.password_hash_algo = algos
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect();
        }
        if let Some(iterations) = network.password_hash_iterations {
            if iterations == 0 {
                return Err(ConfigError::Invalid(
                    "network.password_hash_iterations must be > 0".to_owned(),
                ));
            }
            config.network.password_hash_iterations = iterations;
        }
        if let Some(secret) = network.totp_secret {
            config.network.totp_secret = secret;
        }
        if let Some(timeout) = network.connection_timeout {
            config.network.connection_timeout_secs = timeout;
        }
        if let Some(timeout) = network.tls_handshake_timeout {
            config.network.tls_handshake_timeout_secs = timeout;
        }
        if let Some(commands) = network.commands {
            config.network.commands = commands;
        }
    }

    if let Some(look) = raw.look {
        if let Some(auto_open) = look.auto_open_buffer {
            config.look.auto_open_buffer = auto_open;
        }
        if let Some(sort) = look.hotlist_sort {
            config.look.hotlist_sort = HotlistSort::from_option(&sort);
        }
    }

    if let Some(listen) = raw.listen {
        if let Some(bind) = listen.bind {
            config.listen.bind = bind;
        }
        config.listen.tls_bind = listen.tls_bind;
        config.listen.tls_cert = listen.tls_cert;
        config.listen.tls_key = listen.tls_key;
        config.listen.unix_path = listen.unix_path;
        if config.listen.tls_bind.is_some()
            && (config.listen.tls_cert.is_none() || config.listen.tls_key.is_none())
        {
            return Err(ConfigError::Invalid(
                "listen.tls_bind requires listen.tls_cert and listen.tls_key".to_owned(),
            ));
        }
    }

    for raw_proxy in raw.proxy.unwrap_or_default() {
        let name = raw_proxy
            .name
            .ok_or_else(|| ConfigError::Invalid("proxy entry without name".to_owned()))?;
        let kind_str = raw_proxy
            .kind
            .ok_or_else(|| ConfigError::Invalid(format!("proxy '{name}' without type")))?;
        let kind = ProxyKind::from_option(&kind_str).ok_or_else(|| {
            ConfigError::Invalid(format!("proxy '{name}': unknown type '{kind_str}'"))
        })?;
        let address = raw_proxy
            .address
            .ok_or_else(|| ConfigError::Invalid(format!("proxy '{name}' without address")))?;
        let port = raw_proxy
            .port
            .ok_or_else(|| ConfigError::Invalid(format!("proxy '{name}' without port")))?;
        config.proxies.push(Proxy {
            name,
            kind,
            ipv6: Ipv6Mode::from_option(raw_proxy.ipv6.as_deref().unwrap_or("auto")),
            address,
            port,
            username: raw_proxy.username.unwrap_or_default(),
            password: raw_proxy.password.unwrap_or_default(),
        });
    }

    config.secure = raw.secure.unwrap_or_default();

    Ok(config)
}
