use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use whalecopy_config::WebhookConfig;
use whalecopy_core_types::{ChannelHealthRecord, ChannelId, ChannelState, EnrichedTx};
use whalecopy_rpc::EndpointPool;
use whalecopy_state::SharedState;

use super::Ingress;
use crate::health::HealthBoard;
use crate::telemetry::IngestionTelemetry;
use crate::{Candidate, ChannelPayload, SignalDedup};

/// HTTP webhook ingress (backup channel). `POST /webhook` accepts one or
/// more pre-enriched transactions and always answers 200 so the provider
/// never disables the webhook; `GET /health` is the pipeline's aggregated
/// status surface.
pub struct WebhookIngress {
    config: WebhookConfig,
    board: Arc<HealthBoard>,
    telemetry: Arc<IngestionTelemetry>,
    dedup: Arc<SignalDedup>,
    pool: Arc<EndpointPool>,
    shared: Arc<SharedState>,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct WebhookState {
    sink: mpsc::Sender<Candidate>,
    board: Arc<HealthBoard>,
    telemetry: Arc<IngestionTelemetry>,
    dedup: Arc<SignalDedup>,
    pool: Arc<EndpointPool>,
    shared: Arc<SharedState>,
    body_timeout: Duration,
}

impl WebhookIngress {
    pub fn new(
        config: WebhookConfig,
        board: Arc<HealthBoard>,
        telemetry: Arc<IngestionTelemetry>,
        dedup: Arc<SignalDedup>,
        pool: Arc<EndpointPool>,
        shared: Arc<SharedState>,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            config,
            board,
            telemetry,
            dedup,
            pool,
            shared,
            stop_tx,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Ingress for WebhookIngress {
    fn start(&mut self, sink: mpsc::Sender<Candidate>) -> anyhow::Result<()> {
        let state = WebhookState {
            sink,
            board: Arc::clone(&self.board),
            telemetry: Arc::clone(&self.telemetry),
            dedup: Arc::clone(&self.dedup),
            pool: Arc::clone(&self.pool),
            shared: Arc::clone(&self.shared),
            body_timeout: Duration::from_millis(self.config.body_timeout_ms.max(1_000)),
        };
        let bind = format!("{}:{}", self.config.host, self.config.port);
        let board = Arc::clone(&self.board);
        let mut stop_rx = self.stop_tx.subscribe();

        self.task = Some(tokio::spawn(async move {
            let app = build_router(state);
            let listener = match tokio::net::TcpListener::bind(&bind).await {
                Ok(listener) => listener,
                Err(error) => {
                    warn!(bind = %bind, error = %error, "webhook listener bind failed");
                    board.set_state(ChannelId::Webhook, ChannelState::Disabled);
                    return;
                }
            };
            info!(bind = %bind, "webhook ingress listening");
            board.set_state(ChannelId::Webhook, ChannelState::Active);

            let shutdown = async move {
                let _ = stop_rx.changed().await;
            };
            if let Err(error) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!(error = %error, "webhook server failed");
            }
            board.set_state(ChannelId::Webhook, ChannelState::Disabled);
        }));
        Ok(())
    }

    fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    fn health(&self) -> ChannelHealthRecord {
        self.board.record(ChannelId::Webhook)
    }
}

fn build_router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", post(post_webhook))
        .route("/health", get(get_health))
        .with_state(state)
}

async fn post_webhook(State(state): State<WebhookState>, Json(body): Json<Value>) -> StatusCode {
    state
        .telemetry
        .webhook_posts
        .fetch_add(1, Ordering::Relaxed);

    // Validation failures are logged, never surfaced: a non-200 would get
    // the webhook disabled provider-side.
    let outcome = tokio::time::timeout(state.body_timeout, async {
        enqueue_entries(&state, parse_webhook_body(&body));
    })
    .await;
    if outcome.is_err() {
        warn!("webhook body processing timed out");
    }
    StatusCode::OK
}

/// Accepts either a JSON array of transactions or a single object.
fn parse_webhook_body(body: &Value) -> Vec<Result<EnrichedTx, String>> {
    let entries: Vec<&Value> = match body {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![body],
        other => {
            return vec![Err(format!("unsupported webhook body: {other}"))];
        }
    };
    entries
        .into_iter()
        .map(|entry| {
            serde_json::from_value::<EnrichedTx>(entry.clone())
                .map_err(|error| error.to_string())
                .and_then(|tx| {
                    if tx.signature.trim().is_empty() {
                        Err("missing signature".to_string())
                    } else if tx.fee_payer.trim().is_empty() {
                        Err("missing feePayer".to_string())
                    } else {
                        Ok(tx)
                    }
                })
        })
        .collect()
}

fn enqueue_entries(state: &WebhookState, entries: Vec<Result<EnrichedTx, String>>) {
    for entry in entries {
        match entry {
            Ok(tx) => {
                let candidate = Candidate {
                    payload: ChannelPayload::Enriched(Box::new(tx)),
                    arrived_at: Instant::now(),
                    channel: ChannelId::Webhook,
                };
                match state.sink.try_send(candidate) {
                    Ok(()) => {
                        state.board.touch(ChannelId::Webhook);
                        state
                            .telemetry
                            .candidates_enqueued
                            .fetch_add(1, Ordering::Relaxed);
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        state.board.note_dropped_frame(ChannelId::Webhook);
                        state
                            .telemetry
                            .candidates_dropped_full_sink
                            .fetch_add(1, Ordering::Relaxed);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        warn!("webhook sink closed, dropping candidate");
                    }
                }
            }
            Err(reason) => {
                state
                    .telemetry
                    .webhook_rejected_entries
                    .fetch_add(1, Ordering::Relaxed);
                debug!(reason = %reason, "webhook entry rejected");
            }
        }
    }
}

async fn get_health(State(state): State<WebhookState>) -> impl IntoResponse {
    let channels = state.board.snapshot();
    let emitted_tokens = state.shared.emitted_len().await;
    Json(json!({
        "status": "ok",
        "channels": channels,
        "dedup": {
            "reservations": state.dedup.processed_count(),
            "hits": state.dedup.dedup_hits(),
            "passes": state.dedup.dedup_passes(),
        },
        "rpc_pool_size": state.pool.snapshot().size,
        "emitted_tokens": emitted_tokens,
        "counters": state.telemetry.snapshot(),
    }))
}
