use std::sync::Arc;

use clap::Parser;
use config::Config;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use args::Args;

mod args;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_env()?;

    logger::init(args.log_level.as_deref().unwrap_or(&config.log_level));

    let listen_address = format!("{}:{}", config.server_host, config.server_port);
    let config = Arc::new(config);
    let app = llm::router(config.clone());

    let listener = TcpListener::bind(&listen_address)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind to {listen_address}: {e}"))?;

    log::info!("listening on http://{listen_address}");

    let shutdown = shutdown_signal();

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.map_err(|e| anyhow::anyhow!("server error: {e}"))?;
        }
        _ = shutdown.cancelled() => {
            log::info!("received shutdown signal, shutting down gracefully");
        }
    }

    Ok(())
}

/// Fires on SIGINT or SIGTERM so `main`'s select can stop accepting new connections.
fn shutdown_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let signaled = token.clone();

    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        signaled.cancel();
    });

    token
}
