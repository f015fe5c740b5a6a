use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use textmill::app_state::AppState;
use textmill::config::Config;
use textmill::server;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    config.validate()?;

    if config.mistral_api_key.trim().is_empty() {
        warn!("MISTRAL_API_KEY not set (OCR will fail)");
    }
    if config.openrouter_api_key.trim().is_empty() {
        warn!("OPENROUTER_API_KEY not set (vision classification will fall back to OCR-only)");
    }
    if config.groq_api_key.trim().is_empty() {
        warn!("GROQ_API_KEY not set (audio/video transcription will fail)");
    }

    let port = config.port;
    let max_concurrent = config.max_concurrent_requests;
    let max_ocr = config.max_ocr_concurrent;

    let state = AppState::new(config);
    let shutdown = CancellationToken::new();

    // Periodic housekeeping: rebuild the rate-limiter map and log counters.
    let cleanup_handle = {
        let state = state.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let interval = if state.config.cleanup_interval.is_zero() {
                Duration::from_secs(300)
            } else {
                state.config.cleanup_interval
            };
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // immediate first tick
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let (total, active) = state.metrics.get();
                        info!(
                            active,
                            total,
                            clients = state.rate_limit.tracked_clients(),
                            "housekeeping tick"
                        );
                        state.rate_limit.reset();
                    }
                }
            }
        })
    };

    let app = server::build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        %addr,
        max_concurrent,
        max_ocr,
        "textmill listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    shutdown.cancel();
    let _ = cleanup_handle.await;
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("received shutdown signal, draining...");
    shutdown.cancel();
}
