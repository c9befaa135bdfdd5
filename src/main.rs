use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use share_sender::api::upload_routes;
use share_sender::config::SenderConfig;
use share_sender::dispatcher::{Dispatcher, DispatcherService};
use share_sender::events::EventBus;
use share_sender::executor::TaskExecutor;
use share_sender::transport::HotspotTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SenderConfig::from_env().context("Failed to load configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing(&config);

    eprintln!("📡 Share Sender v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Hotspot receiver: {}", config.hotspot_host);
    eprintln!("   Upload API: http://0.0.0.0:{}/api/uploads", config.http_port);
    eprintln!("   Event WS: ws://0.0.0.0:{}/ws", config.http_port);
    if let Some(dir) = &config.log_dir {
        eprintln!("   Logs: {}", dir.display());
    }
    eprintln!();

    // ── Dispatcher ──────────────────────────────────────────────────────
    let bus = EventBus::new(config.event_capacity);
    let transport = Arc::new(HotspotTransport::new(config.hotspot_host.clone()));
    let executor = Arc::new(TaskExecutor::new(transport, bus.clone()));
    let dispatcher = Dispatcher::new(executor, bus.clone());
    let (handle, _service) = DispatcherService::spawn(dispatcher, config.command_capacity);

    // ── HTTP ────────────────────────────────────────────────────────────
    let app = upload_routes(handle, bus);
    let listener = TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.http_port))?;

    info!(port = config.http_port, "Share sender listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Share sender shut down");
    Ok(())
}

fn init_tracing(config: &SenderConfig) -> Option<WorkerGuard> {
    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "share-sender.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
