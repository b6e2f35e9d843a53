//! SSE transport: one session per event stream, plus /health.
//!
//! A client opens `GET /sse` and receives an `endpoint` event naming the URL
//! to POST its frames to. Every outbound frame of that session (replies,
//! notifications, server-initiated requests) then arrives as a `message`
//! event on the same stream. Closing the stream shuts the session down.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json as AxumJson, Response,
    },
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::Stream;
use serde::Deserialize;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use duplex_core::transport::{self, TransportHandle};
use duplex_core::types::{McpError, McpResult};
use duplex_core::{Session, SessionBuilder};

use super::framing;

pub const SSE_PATH: &str = "/sse";
pub const MESSAGE_PATH: &str = "/message";

struct SessionEntry {
    session: Session,
    handle: TransportHandle,
    /// Held while a POSTed frame is handed to the session, so frames are
    /// accepted one at a time in arrival order.
    intake: Arc<Mutex<()>>,
}

/// Shared server state passed to all handlers via axum State.
pub struct ServerState {
    builder: SessionBuilder,
    sessions: DashMap<Uuid, SessionEntry>,
    started_at: DateTime<Utc>,
}

/// SSE transport for web-based MCP clients.
pub struct SseTransport {
    state: Arc<ServerState>,
}

impl SseTransport {
    pub fn new(builder: SessionBuilder) -> Self {
        Self {
            state: Arc::new(ServerState {
                builder,
                sessions: DashMap::new(),
                started_at: Utc::now(),
            }),
        }
    }

    /// Number of sessions with an open event stream.
    pub fn session_count(&self) -> usize {
        self.state.sessions.len()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(SSE_PATH, get(handle_sse))
            .route(MESSAGE_PATH, post(handle_post))
            .route("/health", get(handle_health))
            .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
            .with_state(self.state.clone())
    }

    /// Run the HTTP server on the given address.
    pub async fn run(&self, addr: &str) -> McpResult<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(McpError::Io)?;

        tracing::info!("SSE transport listening on {addr}");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        Ok(())
    }
}

/// Removes the session from the table and shuts it down when the client
/// goes away.
struct StreamGuard {
    id: Uuid,
    state: Arc<ServerState>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let Some((_, entry)) = self.state.sessions.remove(&self.id) else {
            return;
        };
        tracing::info!("SSE stream for session {} closed", self.id);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { entry.session.shutdown().await });
            }
            Err(_) => tracing::warn!("No runtime to shut session {} down on", self.id),
        }
    }
}

async fn handle_sse(
    State(state): State<Arc<ServerState>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Response> {
    let (handle, mut frames) = transport::channel();
    let session = state
        .builder
        .start(handle.clone())
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e))?;

    let id = session.id();
    state.sessions.insert(
        id,
        SessionEntry {
            session: session.clone(),
            handle,
            intake: Arc::new(Mutex::new(())),
        },
    );
    let guard = StreamGuard {
        id,
        state: state.clone(),
    };

    let stream = async_stream::stream! {
        let _guard = guard;
        yield Ok::<_, Infallible>(
            Event::default()
                .event("endpoint")
                .data(format!("{MESSAGE_PATH}?sessionId={id}")),
        );

        loop {
            let frame = tokio::select! {
                biased;
                frame = frames.recv() => frame,
                _ = session.closed() => None,
            };
            let Some(frame) = frame else { break };
            match serde_json::to_string(&frame) {
                Ok(json) => yield Ok(Event::default().event("message").data(json)),
                Err(e) => tracing::warn!("Dropping unencodable frame: {e}"),
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// Accept one client frame. Replies travel over the event stream, so a
/// decoded frame is always answered with 202.
async fn handle_post(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> Response {
    let Ok(id) = Uuid::parse_str(&query.session_id) else {
        let err = McpError::InvalidRequest(format!("malformed sessionId '{}'", query.session_id));
        return error_response(StatusCode::BAD_REQUEST, &err);
    };

    let Some((session, handle, intake)) = state.sessions.get(&id).map(|entry| {
        (
            entry.session.clone(),
            entry.handle.clone(),
            Arc::clone(&entry.intake),
        )
    }) else {
        return error_response(StatusCode::NOT_FOUND, &McpError::SessionClosed);
    };

    match framing::parse_message(&body) {
        Ok(msg) => {
            let _turn = intake.lock().await;
            if let Some(reply) = session.handle_message(msg).await {
                handle.send(reply);
            }
            StatusCode::ACCEPTED.into_response()
        }
        Err(e) => {
            tracing::warn!("Parse error on session {id}: {e}");
            error_response(StatusCode::BAD_REQUEST, &e)
        }
    }
}

/// Health check endpoint.
async fn handle_health(State(state): State<Arc<ServerState>>) -> AxumJson<serde_json::Value> {
    AxumJson(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.sessions.len(),
        "started_at": state.started_at.to_rfc3339(),
    }))
}

fn error_response(status: StatusCode, error: &McpError) -> Response {
    (status, AxumJson(framing::null_id_error(error))).into_response()
}
