// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::service::{AgentService, InvokeRequest, SessionInfo, SessionSettings};

/// Hard deadline for draining open streams after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Header carrying the optional persistence key on session start.
const PERSISTENCE_KEY_HEADER: &str = "x-persistence-key";

type ApiError = (StatusCode, String);

fn bad_request(e: anyhow::Error) -> ApiError {
    (StatusCode::BAD_REQUEST, e.to_string())
}

pub fn router(service: Arc<AgentService>) -> Router {
    Router::new()
        .route("/v1/sessions", post(start_session))
        .route("/v1/sessions/{id}/invoke", post(invoke))
        .route("/v1/sessions/{id}", delete(clear_session))
        .route("/v1/sessions/{id}/preview", get(preview))
        .route("/v1/scenarios", get(scenarios))
        .with_state(service)
}

async fn start_session(
    State(service): State<Arc<AgentService>>,
    headers: HeaderMap,
    Json(overrides): Json<SessionSettings>,
) -> Result<Json<SessionInfo>, ApiError> {
    let key = headers
        .get(PERSISTENCE_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    service
        .start_session(overrides, key)
        .map(Json)
        .map_err(bad_request)
}

async fn invoke(
    State(service): State<Arc<AgentService>>,
    Path(session_id): Path<String>,
    Json(request): Json<InvokeRequest>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // Dropping the SSE response cancels the invocation.
    let cancel = CancellationToken::new();
    let rx = service
        .invoke(&session_id, request, cancel.clone())
        .map_err(bad_request)?;

    let guard = cancel.drop_guard();
    let stream = ReceiverStream::new(rx).map(move |frame| {
        let _keep_alive_until_stream_ends = &guard;
        let event = Event::default()
            .json_data(&frame)
            .unwrap_or_else(|e| Event::default().data(format!("serialization error: {e}")));
        Ok::<Event, Infallible>(event)
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn clear_session(
    State(service): State<Arc<AgentService>>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    service
        .clear_session(&session_id)
        .await
        .map(|()| Json(serde_json::json!({})))
        .map_err(bad_request)
}

#[derive(Deserialize)]
struct PreviewQuery {
    #[serde(default = "default_preview_max")]
    max_messages: usize,
}

fn default_preview_max() -> usize {
    20
}

async fn preview(
    State(service): State<Arc<AgentService>>,
    Path(session_id): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let text = service
        .conversation_preview(&session_id, query.max_messages)
        .await
        .map_err(bad_request)?;
    Ok(Json(serde_json::json!({ "preview_text": text })))
}

async fn scenarios(
    State(service): State<Arc<AgentService>>,
) -> Json<HashMap<&'static str, Vec<crate::service::ScenarioInfo>>> {
    let mut body = HashMap::new();
    body.insert("scenarios", service.list_scenarios());
    Json(body)
}

/// Bind and serve until interrupted, then drain for at most
/// [`SHUTDOWN_GRACE`] before aborting open streams.
pub async fn serve(addr: &str, service: Arc<AgentService>) -> anyhow::Result<()> {
    let app = router(service);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "server listening");

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            shutdown.cancel();
        });
    }

    let graceful = shutdown.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { graceful.cancelled().await })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => { result?; }
        () = async {
            shutdown.cancelled().await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => {
            warn!("graceful-shutdown deadline reached, aborting open connections");
        }
    }
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
