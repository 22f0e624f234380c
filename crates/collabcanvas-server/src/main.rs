use collabcanvas_server::{ServerConfig, ServerError, serve};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "collabcanvas_server=info,collabcanvas_core=info,tower_http=info".into()
            }),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let listener = tokio::net::TcpListener::bind(config.addr).await?;

    serve(listener, config, shutdown_signal()).await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
