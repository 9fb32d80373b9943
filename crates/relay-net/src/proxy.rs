//! Proxy handshakes: HTTP CONNECT, SOCKS4 and SOCKS5.
//!
//! Each handshake runs over the already-connected stream and leaves it
//! ready to carry the tunneled protocol. Credentials arrive here
//! already evaluated; this crate never sees expressions.

use base64::Engine;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::lookup_host;

use crate::ConnectError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyProtocol {
    Http,
    Socks4,
    Socks5,
}

#[derive(Debug, Clone)]
pub struct ProxySpec {
    pub protocol: ProxyProtocol,
    pub address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

pub(crate) async fn handshake<S>(
    proxy: &ProxySpec,
    stream: &mut S,
    target_host: &str,
    target_port: u16,
) -> Result<(), ConnectError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match proxy.protocol {
        ProxyProtocol::Http => http_connect(proxy, stream, target_host, target_port).await,
        ProxyProtocol::Socks4 => socks4(proxy, stream, target_host, target_port).await,
        ProxyProtocol::Socks5 => socks5(proxy, stream, target_host, target_port).await,
    }
}

/// `CONNECT host:port HTTP/1.0` with optional Basic credentials.
/// Success iff the reply starts with `HTTP/` and carries `200` at
/// bytes 9..12.
async fn http_connect<S>(
    proxy: &ProxySpec,
    stream: &mut S,
    host: &str,
    port: u16,
) -> Result<(), ConnectError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut request = format!("CONNECT {host}:{port} HTTP/1.0\r\n");
    if !proxy.username.is_empty() {
        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", proxy.username, proxy.password));
        request.push_str(&format!("Proxy-Authorization: Basic {credentials}\r\n"));
    }
    request.push_str("\r\n");
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| ConnectError::Proxy(e.to_string()))?;

    let mut response = Vec::new();
    let mut byte = [0u8; 1];
    // read up to the end of headers, bounded
    while !response.ends_with(b"\r\n\r\n") && response.len() < 8192 {
        let n = stream
            .read(&mut byte)
            .await
            .map_err(|e| ConnectError::Proxy(e.to_string()))?;
        if n == 0 {
            break;
        }
        response.push(byte[0]);
    }
    if response.len() < 12
        || !response.starts_with(b"HTTP/")
        || &response[9..12] != b"200"
    {
        return Err(ConnectError::Proxy(format!(
            "HTTP proxy refused CONNECT: {:?}",
            String::from_utf8_lossy(&response[..response.len().min(64)])
        )));
    }
    Ok(())
}

/// SOCKS4 CONNECT; the peer must resolve to IPv4. Success iff the
/// reply's second byte is 90.
async fn socks4<S>(
    proxy: &ProxySpec,
    stream: &mut S,
    host: &str,
    port: u16,
) -> Result<(), ConnectError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let v4 = lookup_host((host, port))
        .await
        .map_err(|e| ConnectError::Proxy(e.to_string()))?
        .find_map(|address| match address {
            std::net::SocketAddr::V4(v4) => Some(*v4.ip()),
            std::net::SocketAddr::V6(_) => None,
        })
        .ok_or_else(|| ConnectError::Proxy(format!("no IPv4 address for {host}")))?;

    let mut request = vec![4u8, 1];
    request.extend_from_slice(&port.to_be_bytes());
    request.extend_from_slice(&v4.octets());
    request.extend_from_slice(proxy.username.as_bytes());
    request.push(0);
    stream
        .write_all(&request)
        .await
        .map_err(|e| ConnectError::Proxy(e.to_string()))?;

    let mut reply = [0u8; 8];
    stream
        .read_exact(&mut reply)
        .await
        .map_err(|e| ConnectError::Proxy(e.to_string()))?;
    if reply[1] != 90 {
        return Err(ConnectError::Proxy(format!(
            "SOCKS4 request rejected (code {})",
            reply[1]
        )));
    }
    Ok(())
}

/// SOCKS5: method selection, optional username/password
/// sub-negotiation, then CONNECT with a domain address (type 3).
async fn socks5<S>(
    proxy: &ProxySpec,
    stream: &mut S,
    host: &str,
    port: u16,
) -> Result<(), ConnectError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let with_auth = !proxy.username.is_empty();
    let methods: &[u8] = if with_auth { &[5, 1, 2] } else { &[5, 1, 0] };
    stream
        .write_all(methods)
        .await
        .map_err(|e| ConnectError::Proxy(e.to_string()))?;

    let mut selection = [0u8; 2];
    stream
        .read_exact(&mut selection)
        .await
        .map_err(|e| ConnectError::Proxy(e.to_string()))?;
    if selection[0] != 5 {
        return Err(ConnectError::Proxy("not a SOCKS5 proxy".to_owned()));
    }
    match selection[1] {
        0 => {}
        2 => {
            // RFC 1929 username/password sub-negotiation
            let username = proxy.username.as_bytes();
            let password = proxy.password.as_bytes();
            if username.len() > 255 || password.len() > 255 {
                return Err(ConnectError::Proxy("credentials too long".to_owned()));
            }
            let mut auth = vec![1u8, username.len() as u8];
            auth.extend_from_slice(username);
            auth.push(password.len() as u8);
            auth.extend_from_slice(password);
            stream
                .write_all(&auth)
                .await
                .map_err(|e| ConnectError::Proxy(e.to_string()))?;
            let mut status = [0u8; 2];
            stream
                .read_exact(&mut status)
                .await
                .map_err(|e| ConnectError::Proxy(e.to_string()))?;
            if status[1] != 0 {
                return Err(ConnectError::Proxy("authentication rejected".to_owned()));
            }
        }
        method => {
            return Err(ConnectError::Proxy(format!(
                "unsupported auth method {method}"
            )));
        }
    }

    let host_bytes = host.as_bytes();
    if host_bytes.len() > 255 {
        return Err(ConnectError::Proxy("target host too long".to_owned()));
    }
    let mut request = vec![5u8, 1, 0, 3, host_bytes.len() as u8];
    request.extend_from_slice(host_bytes);
    request.extend_from_slice(&port.to_be_bytes());
    stream
        .write_all(&request)
        .await
        .map_err(|e| ConnectError::Proxy(e.to_string()))?;

    let mut head = [0u8; 4];
    stream
        .read_exact(&mut head)
        .await
        .map_err(|e| ConnectError::Proxy(e.to_string()))?;
    if head[0] != 5 || head[1] != 0 {
        return Err(ConnectError::Proxy(format!(
            "CONNECT rejected (code {})",
            head[1]
        )));
    }
    // drain the bound-address field, sized by the address type
    let remaining = match head[3] {
        1 => 4 + 2,
        4 => 16 + 2,
        3 => {
            let mut len = [0u8; 1];
            stream
                .read_exact(&mut len)
                .await
                .map_err(|e| ConnectError::Proxy(e.to_string()))?;
            usize::from(len[0]) + 2
        }
        other => {
            return Err(ConnectError::Proxy(format!(
                "unknown address type {other}"
            )));
        }
    };
    let mut rest = vec![0u8; remaining];
    stream
        .read_exact(&mut rest)
        .await
        .map_err(|e| ConnectError::Proxy(e.to_string()))?;
    Ok(())
}
