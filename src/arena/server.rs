//! HTTP/WebSocket front door. One WebSocket connection per participant;
//! everything past the upgrade is handed to the [`Dispatcher`].

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use super::dispatcher::Dispatcher;
use super::protocol::{ClientFrame, ServerFrame};
use super::session::{Connection, SessionTable};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionTable>,
    pub dispatcher: Arc<Dispatcher>,
}

/// Adapts an axum WebSocket sink to the arena's [`Connection`] capability.
/// The sink is shared behind a lock because `send_to_partner`/`send` reach
/// it from a different task than the one reading inbound frames.
struct WebSocketConnection {
    sink: Mutex<futures::stream::SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn send(&self, frame: &ServerFrame) -> bool {
        let payload = match serde_json::to_string(frame) {
            Ok(p) => p,
            Err(err) => {
                warn!(error = %err, "failed to serialize outbound frame");
                return false;
            }
        };
        self.sink.lock().await.send(Message::Text(payload)).await.is_ok()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, mut stream) = socket.split();
    let connection = Arc::new(WebSocketConnection {
        sink: Mutex::new(sink),
    });
    let user_id = state.sessions.connect(connection).await;
    info!(user_id, "connection established");

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(m) => m,
            Err(_) => break,
        };
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(frame) => state.dispatcher.handle_frame(&user_id, frame).await,
                Err(err) => {
                    warn!(user_id, error = %err, "failed to parse inbound frame");
                    state
                        .sessions
                        .send(&user_id, &ServerFrame::error("malformed frame"))
                        .await;
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state
        .dispatcher
        .handle_frame(&user_id, ClientFrame::Disconnect)
        .await;
    info!(user_id, "connection closed");
}

/// Binds and serves the router, blocking until the listener shuts down.
pub async fn serve(host: &str, port: u16, state: AppState) -> std::io::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(addr, "chat-arena listening");
    axum::serve(listener, router(state)).await
}
