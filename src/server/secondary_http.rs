use crate::ledger::Seq;
use crate::replica::ReplicaStore;
use crate::server::{error_response, ShutdownSignal};
use crate::wire::{MessagesResponse, ReplicateRequest, ReplicateResponse, SecondaryHealthResponse};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// The secondary's HTTP surface: the primary-facing ingress plus reads.
pub struct SecondaryServer {
    logger: slog::Logger,
    store: Arc<ReplicaStore>,
    /// Artificial ingress delay, a demonstration hook for the write-concern
    /// wait contract. Zero in any real deployment.
    delay: Duration,
}

#[derive(Clone)]
struct SecondaryCtx {
    logger: slog::Logger,
    store: Arc<ReplicaStore>,
    delay: Duration,
}

impl SecondaryServer {
    pub fn new(logger: slog::Logger, store: Arc<ReplicaStore>, delay: Duration) -> Self {
        SecondaryServer { logger, store, delay }
    }

    pub async fn run(self, addr: SocketAddr, shutdown: ShutdownSignal) -> std::io::Result<()> {
        let logger = self.logger.clone();
        let ctx = SecondaryCtx {
            logger: self.logger.clone(),
            store: self.store,
            delay: self.delay,
        };
        let app = Router::new()
            .route("/replicate", post(replicate))
            .route("/messages", get(list_messages))
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

async fn replicate(State(ctx): State<SecondaryCtx>, body: Bytes) -> Response {
    let request: ReplicateRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            slog::debug!(ctx.logger, "Rejecting malformed replicate body: {}", err);
            return error_response(
                StatusCode::BAD_REQUEST,
                "malformed_request",
                "Expected JSON with string field 'msg' and integer field 'seq'".to_string(),
            );
        }
    };
    if request.seq == 0 {
        return error_response(
            StatusCode::BAD_REQUEST,
            "malformed_request",
            "'seq' must be a positive integer".to_string(),
        );
    }
    let seq = Seq::new(request.seq);

    // Duplicates are answered before the artificial delay; the primary's
    // worker only needs to learn that this seq is safe to advance past.
    if ctx.store.contains(seq) {
        slog::debug!(ctx.logger, "Ignoring duplicate delivery of seq {}", seq);
        return ok(true);
    }

    if !ctx.delay.is_zero() {
        slog::info!(ctx.logger, "Simulating delay of {:?} before applying seq {}", ctx.delay, seq);
        tokio::time::sleep(ctx.delay).await;
    }

    let outcome = ctx.store.ingest(seq, Bytes::from(request.msg.into_bytes()));
    if outcome.duplicate {
        slog::debug!(ctx.logger, "Ignoring duplicate delivery of seq {}", seq);
    } else if outcome.promoted > 0 {
        slog::info!(
            ctx.logger,
            "Applied seq {}, {} message(s) visible",
            seq,
            ctx.store.applied_len()
        );
    } else {
        slog::info!(
            ctx.logger,
            "Buffered out-of-order seq {} ({} applied so far)",
            seq,
            ctx.store.applied_len()
        );
    }

    ok(outcome.duplicate)
}

fn ok(duplicate: bool) -> Response {
    Json(ReplicateResponse {
        status: "ok".to_string(),
        duplicate,
    })
    .into_response()
}

async fn list_messages(State(ctx): State<SecondaryCtx>) -> Json<MessagesResponse> {
    let messages = ctx
        .store
        .snapshot()
        .iter()
        .map(|payload| String::from_utf8_lossy(payload).into_owned())
        .collect();

    Json(MessagesResponse { messages })
}

async fn health(State(ctx): State<SecondaryCtx>) -> Json<SecondaryHealthResponse> {
    Json(SecondaryHealthResponse {
        status: "ok".to_string(),
        delay_ms: ctx.delay.as_millis() as u64,
        count: ctx.store.applied_len(),
    })
}
