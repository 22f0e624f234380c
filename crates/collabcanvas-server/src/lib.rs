//! CollabCanvas WebSocket Relay Server
//!
//! Every client connects to `/ws` and joins the single shared canvas.
//!
//! ## Protocol
//!
//! Messages are JSON text frames tagged by `type`:
//! ```json
//! { "type": "start", "strokeId": "s1", "tool": "brush", "color": "#000000", "stroke": 2, "xNorm": 0.1, "yNorm": 0.2 }
//! { "type": "undo" }
//! { "type": "initCanvas", "events": [ ... ] }
//! ```
//! Drawing events are sequenced and relayed to everyone except the sender;
//! `undo`, `redo` and `clear` push a fresh `initCanvas` to everyone.

pub mod config;
pub mod hub;

use std::future::Future;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use collabcanvas_core::presence::PeerId;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

pub use config::{ConfigError, ServerConfig};
pub use hub::{Hub, HubHandle};

/// Fatal server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the HTTP routes around a running hub.
pub fn router(hub: HubHandle) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(hub)
}

/// Serve on `listener` until `shutdown` resolves. All state is discarded on
/// return.
pub async fn serve<F>(listener: TcpListener, config: ServerConfig, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let hub = Hub::new(config.outbox_cap).spawn();
    let app = router(hub);

    let addr = listener.local_addr()?;
    info!("CollabCanvas server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Server stopped, canvas discarded");
    Ok(())
}

/// Index page
async fn index() -> &'static str {
    "CollabCanvas Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<HubHandle>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, hub: HubHandle) {
    let peer = PeerId::new();
    info!(%peer, "New connection");

    let (mut sender, mut receiver) = socket.split();
    let mut outbox = hub.connect(peer);

    loop {
        tokio::select! {
            // Inbound frames go to the hub in arrival order
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => hub.message(peer, text),
                    Some(Ok(Message::Binary(_))) => {
                        debug!(%peer, "Ignoring binary frame");
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore ping/pong
                    Some(Err(e)) => {
                        warn!(%peer, "WebSocket error: {}", e);
                        break;
                    }
                }
            }

            // Frames the hub queued for this connection
            frame = outbox.recv() => {
                match frame {
                    Some(frame) => {
                        if sender.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    hub.disconnect(peer);
    info!(%peer, "Connection closed");
}
