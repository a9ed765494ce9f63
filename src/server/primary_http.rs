use crate::primary::{AppendError, PrimaryNode};
use crate::server::{error_response, ShutdownSignal};
use crate::wire::{
    AckView, AppendRequest, AppendResponse, MessagesResponse, PrimaryHealthResponse, SecondaryStatusView,
};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// The primary's client-facing HTTP surface: append, read back, health.
pub struct PrimaryServer {
    logger: slog::Logger,
    node: Arc<PrimaryNode>,
}

#[derive(Clone)]
struct PrimaryCtx {
    logger: slog::Logger,
    node: Arc<PrimaryNode>,
}

impl PrimaryServer {
    pub fn new(logger: slog::Logger, node: Arc<PrimaryNode>) -> Self {
        PrimaryServer { logger, node }
    }

    pub async fn run(self, addr: SocketAddr, shutdown: ShutdownSignal) -> std::io::Result<()> {
        let logger = self.logger.clone();
        let ctx = PrimaryCtx {
            logger: self.logger.clone(),
            node: self.node,
        };
        let app = Router::new()
            .route("/messages", post(append_message).get(list_messages))
            .route("/health", get(health))
            .with_state(ctx);

        slog::info!(logger, "Listening on '{}'", addr);
        let listener = TcpListener::bind(addr).await?;
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;
        slog::info!(logger, "Server run() has exited: {:?}", result);

        result
    }
}

async fn append_message(State(ctx): State<PrimaryCtx>, body: Bytes) -> Response {
    let request: AppendRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            slog::debug!(ctx.logger, "Rejecting malformed append body: {}", err);
            return error_response(
                StatusCode::BAD_REQUEST,
                "malformed_request",
                "Expected JSON with string field 'msg' and optional integer 'w'".to_string(),
            );
        }
    };

    slog::debug!(ctx.logger, "ClientWire - POST /messages w={:?}", request.w);
    let payload = Bytes::from(request.msg.into_bytes());

    match ctx.node.append(payload, request.w).await {
        Ok(outcome) => {
            let response = AppendResponse {
                messages: render(ctx.node.messages()),
                acks: outcome
                    .acks
                    .iter()
                    .map(|id| AckView {
                        secondary: id.as_str().to_string(),
                        ack: "ok".to_string(),
                    })
                    .collect(),
                w: outcome.w,
                duration_ms: outcome.duration.as_millis() as u64,
                seq: outcome.seq.val(),
            };
            (StatusCode::CREATED, Json(response)).into_response()
        }
        Err(err @ AppendError::InvalidWriteConcern { .. }) => {
            error_response(StatusCode::BAD_REQUEST, "invalid_write_concern", err.to_string())
        }
        Err(err @ AppendError::NoQuorum { .. }) => {
            slog::warn!(ctx.logger, "Append rejected: {}", err);
            error_response(StatusCode::SERVICE_UNAVAILABLE, "no_quorum", err.to_string())
        }
    }
}

async fn list_messages(State(ctx): State<PrimaryCtx>) -> Json<MessagesResponse> {
    Json(MessagesResponse {
        messages: render(ctx.node.messages()),
    })
}

async fn health(State(ctx): State<PrimaryCtx>) -> Json<PrimaryHealthResponse> {
    let secondary_statuses = ctx
        .node
        .secondary_statuses()
        .into_iter()
        .map(|status| SecondaryStatusView {
            addr: status.id.into_inner(),
            healthy: status.healthy,
            last_seen_ms: status.last_seen.map(|age| age.as_millis() as u64),
        })
        .collect();

    Json(PrimaryHealthResponse {
        status: "ok".to_string(),
        count: ctx.node.log_size(),
        secondaries: ctx
            .node
            .secondary_ids()
            .iter()
            .map(|id| id.as_str().to_string())
            .collect(),
        secondary_statuses,
    })
}

fn render(payloads: Vec<Bytes>) -> Vec<String> {
    payloads
        .iter()
        .map(|payload| String::from_utf8_lossy(payload).into_owned())
        .collect()
}
