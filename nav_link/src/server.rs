// WebSocket endpoint for a remote operator. Each connection receives every outbound
// record as JSON text and every stream frame as a binary JPEG message; text it sends
// back is parsed as an `InboundCommand` and queued for the vehicle loop.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::{InboundCommand, LinkBus, ServerConfig};

fn ws_handler_with_bus(ws: WebSocketUpgrade, bus: LinkBus) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_conn(socket, bus))
}

async fn ws_conn(socket: WebSocket, bus: LinkBus) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut messages = bus.subscribe();
    let mut frames = bus.subscribe_frames();
    info!("operator connected");

    loop {
        tokio::select! {
            msg = messages.recv() => match msg {
                Ok(envelope) => {
                    let Ok(text) = serde_json::to_string(&envelope) else { continue };
                    if ws_tx.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => debug!(skipped = n, "operator lagging on records"),
                Err(RecvError::Closed) => break,
            },
            pkt = frames.recv() => match pkt {
                Ok(pkt) => {
                    if ws_tx.send(Message::Binary(pkt.jpeg.as_ref().to_vec())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(txt))) => match serde_json::from_str::<InboundCommand>(&txt) {
                    Ok(command) => {
                        if let Err(e) = bus.submit_command(command) {
                            warn!(error = %e, command = command.name(), "command dropped");
                        }
                    }
                    Err(e) => warn!(error = %e, "unparseable command"),
                },
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    info!("operator disconnected");
}

/// Binds `cfg.bind_addr` and serves `/ws` and `/healthz` until the task is aborted.
pub async fn start_server(bus: LinkBus, cfg: ServerConfig) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/ws",
            get(move |ws: WebSocketUpgrade| {
                let bus = bus.clone();
                async move { ws_handler_with_bus(ws, bus) }
            }),
        );

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    info!(addr = %cfg.bind_addr, "link server listening");
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "link server stopped");
        }
    });

    Ok(server)
}
