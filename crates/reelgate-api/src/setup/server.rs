//! Server startup and graceful shutdown

use super::Application;
use anyhow::Result;
use reelgate_core::Config;

/// Serve until Ctrl+C or SIGTERM, then stop the background tasks
pub async fn start_server(config: &Config, app: Application) -> Result<()> {
    let addr = format!("0.0.0.0:{}", config.base.server_port);
    tracing::info!(addr = %addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        max_upload_mb = config.upload.max_upload_size_bytes / 1024 / 1024,
        chunk_size_bytes = config.upload.chunk_size_bytes,
        video_extensions = %config.upload.allowed_formats.join(","),
        hls_variants = %config.transcode.hls_variants.join(","),
        ffmpeg_path = %config.transcode.ffmpeg_path,
        max_concurrent_transcodes = config.transcode.max_concurrent_transcodes,
        "Server ready and accepting connections"
    );

    axum::serve(listener, app.router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for task in app.background_tasks {
        task.abort();
    }

    Ok(())
}

/// Resolves on Ctrl+C (SIGINT) or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down gracefully...");
}
