// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # chainwatch Server
//!
//! Entry point for the `chainwatch-server` binary. Parses CLI flags,
//! initializes logging and metrics, wires the monitoring core to its
//! transports, optionally starts the watchdog loop, and serves the
//! operator HTTP surface (plus an optional TLS listener).
//!
//! Shutdown is cooperative: on SIGINT/SIGTERM the watchdog persists its
//! config, the credential map is rewritten, and both listeners drain
//! before the process exits.

mod auth;
mod cli;
mod http;
mod logging;
mod mailer;
mod metrics;
mod net_transport;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;

use chainwatch::commands::CommandEngine;
use chainwatch::mailer::Mailer;
use chainwatch::mock::MockTransport;
use chainwatch::model::node::NetworkAddress;
use chainwatch::monitor::{MonitorOptions, NetworkMonitor};
use chainwatch::transport::{Clock, ConfigStore, SystemClock, Transport};
use chainwatch::watchdog::Watchdog;

use auth::AuthState;
use cli::ServerCli;
use http::AppState;
use logging::LogFormat;
use mailer::LogMailer;
use metrics::ServerMetrics;
use net_transport::HttpTransport;
use store::FileStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ServerCli::parse();

    // --- Logging ---
    let log_filter = format!(
        "chainwatch={level},chainwatch_server={level},tower_http=warn",
        level = cli.log_level
    );
    logging::init_logging(&log_filter, LogFormat::from_str_lossy(&cli.log_format));

    tracing::info!(
        eth_rpc = %cli.eth_rpc_address,
        http_port = cli.http_port,
        https_port = cli.https_port,
        mock = cli.mock_mode,
        dump_rpc = cli.dump_rpc,
        watchdog = cli.start_watchdog,
        auth = cli.with_auth,
        "starting chainwatch-server"
    );

    // --- Stores and transports ---
    let working_dir = std::env::current_dir().context("cannot resolve working directory")?;
    let store: Arc<dyn ConfigStore> = Arc::new(FileStore::new(working_dir));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let transport: Arc<dyn Transport> = if cli.mock_mode {
        match MockTransport::from_dir(&cli.mock_dir) {
            Ok(mock) => {
                tracing::info!(dir = %cli.mock_dir.display(), "mock mode: replaying canned responses");
                Arc::new(mock)
            }
            Err(err) => {
                tracing::warn!("cannot load mock responses: {err}; starting with none");
                Arc::new(MockTransport::new())
            }
        }
    } else {
        Arc::new(HttpTransport::new()?)
    };

    // --- Core wiring ---
    let monitor = NetworkMonitor::new(
        transport,
        Arc::clone(&clock),
        MonitorOptions {
            default_access_address: NetworkAddress::new(cli.eth_rpc_address.clone()),
            dump_store: cli.dump_rpc.then(|| Arc::clone(&store)),
            ..MonitorOptions::default()
        },
    );

    let server_metrics = Arc::new(ServerMetrics::new());
    let mail_backend: Arc<dyn Mailer> = Arc::new(LogMailer::new(&server_metrics));
    let watchdog = Watchdog::new(
        Arc::clone(&monitor),
        mail_backend,
        Arc::clone(&store),
        Arc::clone(&clock),
        local_ip(),
    );
    let engine = Arc::new(CommandEngine::new(Arc::clone(&monitor), Arc::clone(&watchdog)));
    let auth = cli.with_auth.then(|| Arc::new(AuthState::load(store.as_ref())));

    let app_state = AppState {
        engine,
        monitor: Arc::clone(&monitor),
        metrics: Arc::clone(&server_metrics),
        auth: auth.clone(),
    };
    let mut router = http::build_router(app_state, &cli.static_dir);
    if let Some(auth) = &auth {
        router = router.layer(axum::middleware::from_fn_with_state(
            Arc::clone(auth),
            auth::require_auth,
        ));
    }

    // --- Shutdown plumbing ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // --- Watchdog loop ---
    let watchdog_task = if cli.start_watchdog {
        Some(tokio::spawn(Arc::clone(&watchdog).run(shutdown_rx.clone())))
    } else {
        None
    };

    // --- HTTP listener ---
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cli.http_port))
        .await
        .with_context(|| format!("failed to bind http listener on port {}", cli.http_port))?;
    tracing::info!("operator surface listening on :{}", cli.http_port);

    // --- Optional TLS listener ---
    let tls_handle = axum_server::Handle::new();
    let tls_task = if cli.https_port != 0 {
        let config = RustlsConfig::from_pem_file(&cli.tls_cert, &cli.tls_key)
            .await
            .with_context(|| {
                format!(
                    "cannot load TLS key material from {} / {}",
                    cli.tls_cert.display(),
                    cli.tls_key.display()
                )
            })?;
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.https_port));
        tracing::info!("TLS surface listening on :{}", cli.https_port);
        let handle = tls_handle.clone();
        let tls_router = router.clone();
        Some(tokio::spawn(async move {
            axum_server::bind_rustls(addr, config)
                .handle(handle)
                .serve(tls_router.into_make_service())
                .await
        }))
    } else {
        None
    };

    print_startup_banner(&cli);

    let mut http_shutdown = shutdown_rx.clone();
    let mut http_task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = http_shutdown.changed().await;
            })
            .await
    });

    // --- Await shutdown ---
    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining");
        }
        result = &mut http_task => {
            match result {
                Ok(Ok(())) => tracing::warn!("http server exited"),
                Ok(Err(err)) => tracing::error!("http server error: {err}"),
                Err(err) => tracing::error!("http task failed: {err}"),
            }
        }
    }

    // --- Roll down: watchdog persists, listeners drain, credentials saved ---
    let _ = shutdown_tx.send(true);
    tls_handle.graceful_shutdown(Some(Duration::from_secs(5)));
    if let Some(task) = watchdog_task {
        let _ = task.await;
    }
    if !http_task.is_finished() {
        let _ = http_task.await;
    }
    if let Some(task) = tls_task {
        let _ = task.await;
    }
    if let Some(auth) = &auth {
        auth.save(store.as_ref());
    }

    tracing::info!("chainwatch-server stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Startup banner
// ---------------------------------------------------------------------------

/// Prints a short configuration summary to stdout.
fn print_startup_banner(cli: &ServerCli) {
    println!();
    println!("  chainwatch v{}", env!("CARGO_PKG_VERSION"));
    println!("  Entry point : {}", cli.eth_rpc_address);
    println!("  HTTP        : http://0.0.0.0:{}", cli.http_port);
    if cli.https_port != 0 {
        println!("  HTTPS       : https://0.0.0.0:{}", cli.https_port);
    }
    println!(
        "  Watchdog    : {}",
        if cli.start_watchdog { "running" } else { "off" }
    );
    println!(
        "  Mode        : {}",
        if cli.mock_mode { "mock" } else { "live" }
    );
    println!();
}

// ---------------------------------------------------------------------------
// Host identity
// ---------------------------------------------------------------------------

/// Best-effort local IP, advertised in watchdog notifications. The UDP
/// connect never sends a packet; it only makes the kernel pick a route.
fn local_ip() -> String {
    std::net::UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string())
}

// ---------------------------------------------------------------------------
// Shutdown signal
// ---------------------------------------------------------------------------

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ip_is_parseable() {
        let ip = local_ip();
        assert!(
            ip.parse::<std::net::IpAddr>().is_ok(),
            "local_ip returned: {ip}"
        );
    }
}
