use std::env;
use std::time::Duration;

use relay_core::{config, Host};
use relayd::{listener, ServerState};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let cfg = match env::var("RELAY_CONFIG") {
        Ok(path) => match config::load_config_from_path(std::path::Path::new(&path)) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!(path, error = %e, "failed to load config");
                std::process::exit(1);
            }
        },
        Err(_) => config::Config::default(),
    };

    let listen = cfg.listen.clone();
    let tls_handshake_timeout = Duration::from_secs(cfg.network.tls_handshake_timeout_secs);
    let host = Host::new(cfg);
    let state = ServerState::new(host);

    let listener_tcp = tokio::net::TcpListener::bind(&listen.bind)
        .await
        .expect("failed to bind");
    tokio::spawn(listener::serve_tcp(state.clone(), listener_tcp));

    if let (Some(tls_bind), Some(cert), Some(key)) =
        (&listen.tls_bind, &listen.tls_cert, &listen.tls_key)
    {
        match listener::load_tls_acceptor(cert, key) {
            Ok(acceptor) => {
                let listener_tls = tokio::net::TcpListener::bind(tls_bind)
                    .await
                    .expect("failed to bind TLS listener");
                tokio::spawn(listener::serve_tls(
                    state.clone(),
                    listener_tls,
                    acceptor,
                    tls_handshake_timeout,
                ));
            }
            Err(e) => {
                error!(error = %e, "failed to set up TLS listener");
                std::process::exit(1);
            }
        }
    }

    #[cfg(unix)]
    if let Some(path) = &listen.unix_path {
        // stale socket files block bind after an unclean shutdown
        let _ = std::fs::remove_file(path);
        let listener_unix =
            tokio::net::UnixListener::bind(path).expect("failed to bind unix socket");
        tokio::spawn(listener::serve_unix(state.clone(), listener_unix));
    }

    info!("relay ready");
    shutdown_signal().await;
    info!("relay shut down");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
