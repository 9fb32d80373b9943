// relay-net: asynchronous connection establishment — name resolution
// with family grouping and retry shuffling, optional proxy handshake
// (HTTP CONNECT, SOCKS4, SOCKS5), optional TLS, and a watchdog
// timeout. The slow path runs on the runtime; the caller just awaits
// a typed result and can cancel by dropping the future.

pub mod proxy;
mod resolve;

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpSocket, TcpStream};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

pub use proxy::{ProxyProtocol, ProxySpec};
pub use resolve::AddressFamilyMode;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("address resolution failed: {0}")]
    Resolution(String),
    #[error("no address matches the requested family")]
    AddressFamily,
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("proxy handshake failed: {0}")]
    Proxy(String),
    #[error("TLS handshake failed: {0}")]
    Tls(String),
    #[error("connection timed out")]
    Timeout,
}

/// TLS stage, applied after the socket (and any proxy) is up.
pub struct TlsOptions {
    pub connector: TlsConnector,
    pub server_name: String,
}

pub struct ConnectOptions {
    pub address: String,
    pub port: u16,
    pub family: AddressFamilyMode,
    /// Retry counter; shifts the starting address-family group so
    /// successive attempts spread over the result set.
    pub retry: u32,
    pub proxy: Option<ProxySpec>,
    pub tls: Option<TlsOptions>,
    pub timeout: Duration,
}

impl ConnectOptions {
    pub fn new(address: &str, port: u16) -> Self {
        Self {
            address: address.to_owned(),
            port,
            family: AddressFamilyMode::Auto,
            retry: 0,
            proxy: None,
            tls: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub enum ConnectedStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

pub struct Connection {
    pub stream: ConnectedStream,
    /// IP address actually connected to (the proxy's when one is used).
    pub remote_ip: String,
}

/// Connects to `options.address:options.port`, going through the proxy
/// and TLS stages when configured. The whole operation is bounded by
/// `options.timeout`.
pub async fn connect(options: ConnectOptions) -> Result<Connection, ConnectError> {
    match tokio::time::timeout(options.timeout, connect_stages(options)).await {
        Ok(result) => result,
        Err(_) => Err(ConnectError::Timeout),
    }
}

async fn connect_stages(options: ConnectOptions) -> Result<Connection, ConnectError> {
    // resolve the peer we actually dial: the proxy when one is set
    let (dial_host, dial_port) = match &options.proxy {
        Some(proxy) => (proxy.address.clone(), proxy.port),
        None => (options.address.clone(), options.port),
    };

    let addresses =
        resolve::resolve_ordered(&dial_host, dial_port, options.family, options.retry).await?;
    if addresses.is_empty() {
        return Err(ConnectError::AddressFamily);
    }

    let (mut stream, remote_ip) = connect_first(&addresses).await?;

    if let Some(proxy) = &options.proxy {
        proxy::handshake(proxy, &mut stream, &options.address, options.port).await?;
    }

    let stream = match options.tls {
        None => ConnectedStream::Plain(stream),
        Some(tls) => {
            let server_name = rustls::pki_types::ServerName::try_from(tls.server_name.clone())
                .map_err(|e| ConnectError::Tls(e.to_string()))?;
            let tls_stream = tls
                .connector
                .connect(server_name, stream)
                .await
                .map_err(|e| ConnectError::Tls(e.to_string()))?;
            ConnectedStream::Tls(Box::new(tls_stream))
        }
    };

    Ok(Connection { stream, remote_ip })
}

/// Tries each address in order; the first successful connect wins.
async fn connect_first(addresses: &[SocketAddr]) -> Result<(TcpStream, String), ConnectError> {
    let mut last_error = None;
    for address in addresses {
        match connect_one(*address).await {
            Ok(stream) => {
                debug!(peer = %address, "connected");
                return Ok((stream, address.ip().to_string()));
            }
            Err(e) => {
                debug!(peer = %address, error = %e, "connect attempt failed");
                last_error = Some(e);
            }
        }
    }
    Err(ConnectError::Connection(
        last_error.map_or_else(|| "no address to try".to_owned(), |e| e.to_string()),
    ))
}

async fn connect_one(address: SocketAddr) -> std::io::Result<TcpStream> {
    let socket = if address.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.set_keepalive(true)?;
    socket.connect(address).await
}
