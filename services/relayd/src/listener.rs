//! Listeners: plain TCP, TLS and UNIX sockets. Every accepted
//! connection gets its own client task.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};

use crate::client::handle_client;
use crate::state::ServerState;

pub async fn serve_tcp(state: ServerState, listener: TcpListener) {
    info!(addr = ?listener.local_addr().ok(), "listening (tcp)");
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let _ = stream.set_nodelay(true);
                tokio::spawn(handle_client(stream, state.clone(), peer.to_string()));
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

pub async fn serve_tls(
    state: ServerState,
    listener: TcpListener,
    acceptor: TlsAcceptor,
    handshake_timeout: Duration,
) {
    info!(addr = ?listener.local_addr().ok(), "listening (tls)");
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let _ = stream.set_nodelay(true);
                let state = state.clone();
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
                        Ok(Ok(tls_stream)) => {
                            handle_client(tls_stream, state, format!("{peer} (tls)")).await;
                        }
                        Ok(Err(e)) => {
                            warn!(peer = %peer, error = %e, "TLS handshake failed");
                        }
                        Err(_) => {
                            warn!(peer = %peer, "TLS handshake timed out");
                        }
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Loads the server certificate chain and private key (PEM files).
pub fn load_tls_acceptor(cert_path: &str, key_path: &str) -> Result<TlsAcceptor, String> {
    let cert_file = std::fs::File::open(cert_path)
        .map_err(|e| format!("opening certificate '{cert_path}': {e}"))?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut std::io::BufReader::new(cert_file))
        .collect::<Result<_, _>>()
        .map_err(|e| format!("reading certificate '{cert_path}': {e}"))?;
    if certs.is_empty() {
        return Err(format!("no certificate found in '{cert_path}'"));
    }
    let key_file =
        std::fs::File::open(key_path).map_err(|e| format!("opening key '{key_path}': {e}"))?;
    let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(key_file))
        .map_err(|e| format!("reading key '{key_path}': {e}"))?
        .ok_or_else(|| format!("no private key found in '{key_path}'"))?;
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| format!("building TLS config: {e}"))?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(unix)]
pub async fn serve_unix(state: ServerState, listener: tokio::net::UnixListener) {
    info!(addr = ?listener.local_addr().ok(), "listening (unix)");
    let mut counter = 0u64;
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                counter += 1;
                tokio::spawn(handle_client(
                    stream,
                    state.clone(),
                    format!("unix#{counter}"),
                ));
            }
            Err(e) => {
                error!(error = %e, "unix accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}
