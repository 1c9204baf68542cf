//! WebSocket endpoint serving the client channel protocol.
//!
//! # Responsibilities
//! - Accept upgrades at `/events` with subscription query parameters
//! - Greet, subscribe, and optionally replay backlog for each client
//! - Run one send loop and one receive loop per connection
//! - Route client signing responses into the coordinator
//!
//! # Data Flow
//! ```text
//! bus queue ──→ send loop ──→ socket        (events, signing requests)
//! socket  ──→ receive loop ──→ coordinator  ({id, chainId, data})
//! ```

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::events::WsMessage;
use crate::filters::FilterScheduler;
use crate::signing::{SigningCoordinator, SigningResponse};
use crate::ws::bus::MessageBus;
use crate::ws::client::{ClientId, Interest};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<MessageBus>,
    pub scheduler: Arc<FilterScheduler>,
    pub coordinator: Arc<SigningCoordinator>,
    /// Daemon start time, echoed in the connected greeting.
    pub start_time: String,
    /// Per-message socket write deadline.
    pub send_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    /// `"all"` (default) or a comma-separated list of event kinds.
    events: Option<String>,
    /// Replay the filters' backlog to this client after subscribing.
    #[serde(default)]
    replay: bool,
    /// Register as the designated transaction-signing client.
    #[serde(default)]
    signer: bool,
}

/// Build the websocket router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events", get(events_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve until the shutdown signal fires.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "WebSocket server starting");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("WebSocket server stopped");
    Ok(())
}

async fn events_handler(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let interest = match Interest::parse(query.events.as_deref().unwrap_or("all")) {
        Ok(interest) => interest,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    ws.on_upgrade(move |socket| handle_socket(state, socket, interest, query.replay, query.signer))
}

async fn handle_socket(
    state: AppState,
    socket: WebSocket,
    interest: Interest,
    replay: bool,
    signer: bool,
) {
    let (client_id, mut outbound) = state.bus.register(interest.clone(), signer);
    tracing::info!(client = %client_id, signer, "Client connected");

    let kinds = interest.kinds();
    if let Err(e) = state.scheduler.subscribe(client_id, &kinds).await {
        tracing::error!(client = %client_id, error = %e, "Subscription failed");
        state.bus.unregister(client_id);
        return;
    }

    // Greeting goes out once the filters are live: a client that has read it
    // can rely on subsequent chain activity being observed.
    state.bus.send_to(
        client_id,
        WsMessage::Connected {
            start_time: state.start_time.clone(),
        },
    );

    if replay {
        if let Err(e) = state.scheduler.replay_to(client_id, &kinds).await {
            tracing::warn!(client = %client_id, error = %e, "Backlog replay failed");
            state
                .bus
                .send_to(client_id, WsMessage::error("backlog replay failed"));
        }
    }

    let (mut sink, mut stream) = socket.split();

    // Send loop: drain the bus queue into the socket. A write that cannot
    // complete within the deadline ends the connection; the bus never waits.
    let send_timeout = state.send_timeout;
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode outbound message");
                    continue;
                }
            };
            match tokio::time::timeout(send_timeout, sink.send(Message::Text(text.into()))).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => break,
            }
        }
    });

    // Receive loop: the only expected client traffic is signing responses.
    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    handle_client_message(&recv_state, client_id, text.as_str());
                }
                Ok(Message::Close(_)) | Err(_) => break,
                // Ping/pong handled by axum.
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.bus.unregister(client_id);
    state.scheduler.unsubscribe_client(client_id);
    state.coordinator.client_disconnected(client_id);
    tracing::info!(client = %client_id, "Client disconnected");
}

fn handle_client_message(state: &AppState, client_id: ClientId, text: &str) {
    match serde_json::from_str::<SigningResponse>(text) {
        Ok(response) => {
            if let Err(e) = state.coordinator.resolve(response) {
                state.bus.send_to(client_id, WsMessage::error(e.to_string()));
            }
        }
        Err(e) => {
            tracing::warn!(client = %client_id, error = %e, "Unparseable client message");
            state.bus.send_to(
                client_id,
                WsMessage::error(format!("malformed signing response: {e}")),
            );
        }
    }
}
