use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time;
use tracing::{debug, info, warn};
use whalecopy_core_types::{ChannelId, ParsedTx};
use whalecopy_rpc::EndpointPool;
use whalecopy_state::SharedState;

use crate::decoder::{decode_stream_tx, normalize_enriched, parse_rpc_json, DecodeError};
use crate::health::HealthBoard;
use crate::telemetry::IngestionTelemetry;
use crate::{Candidate, ChannelPayload, SignalDedup};

const DRAIN_BUDGET: Duration = Duration::from_secs(5);

/// Signature handed to the fallback fetchers when the local decoder could
/// not parse a stream candidate.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub signature: String,
    pub channel: ChannelId,
}

/// A candidate that survived decode and dedup, on its way to the
/// classifier. Carries its ingress arrival instant so the emission end
/// can measure the full signal-to-emission latency.
pub struct ParsedCandidate {
    pub tx: ParsedTx,
    pub channel: ChannelId,
    pub arrived_at: Instant,
}

pub struct SupervisorHandles {
    pub candidate_tx: mpsc::Sender<Candidate>,
    pub parsed_rx: mpsc::Receiver<ParsedCandidate>,
}

/// Fan-in router: one task over the merged candidate channel. Decodes or
/// normalizes each candidate, reserves its dedup fingerprint, and
/// forwards survivors to the classifier. Owns no transaction state and
/// converts every error below itself into drop-plus-debug-log.
pub struct Supervisor {
    candidate_rx: mpsc::Receiver<Candidate>,
    parsed_tx: mpsc::Sender<ParsedCandidate>,
    dedup: Arc<SignalDedup>,
    shared: Arc<SharedState>,
    board: Arc<HealthBoard>,
    telemetry: Arc<IngestionTelemetry>,
    fetch_tx: Option<mpsc::Sender<FetchRequest>>,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue_capacity: usize,
        dedup: Arc<SignalDedup>,
        shared: Arc<SharedState>,
        board: Arc<HealthBoard>,
        telemetry: Arc<IngestionTelemetry>,
        fetch_tx: Option<mpsc::Sender<FetchRequest>>,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, SupervisorHandles) {
        let capacity = queue_capacity.max(16);
        let (candidate_tx, candidate_rx) = mpsc::channel(capacity);
        let (parsed_tx, parsed_rx) = mpsc::channel(capacity);
        (
            Self {
                candidate_rx,
                parsed_tx,
                dedup,
                shared,
                board,
                telemetry,
                fetch_tx,
                shutdown,
            },
            SupervisorHandles {
                candidate_tx,
                parsed_rx,
            },
        )
    }

    /// Wire the fallback fetchers in after construction; the fetch pool
    /// needs the supervisor's own candidate sender to re-inject results.
    pub fn set_fetch_tx(&mut self, fetch_tx: mpsc::Sender<FetchRequest>) {
        self.fetch_tx = Some(fetch_tx);
    }

    pub async fn run(mut self) {
        info!("channel supervisor started");
        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        self.drain().await;
                        break;
                    }
                }
                candidate = self.candidate_rx.recv() => {
                    match candidate {
                        Some(candidate) => self.handle_candidate(candidate),
                        None => break,
                    }
                }
            }
        }
        info!("channel supervisor stopped");
    }

    /// Bounded drain: consume whatever is already buffered, then exit.
    async fn drain(&mut self) {
        let deadline = Instant::now() + DRAIN_BUDGET;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match time::timeout(remaining, self.candidate_rx.recv()).await {
                Ok(Some(candidate)) => self.handle_candidate(candidate),
                Ok(None) | Err(_) => break,
            }
        }
    }

    fn handle_candidate(&self, candidate: Candidate) {
        let channel = candidate.channel;
        let arrived_at = candidate.arrived_at;
        let parsed = match candidate.payload {
            ChannelPayload::Stream { info, block_time } => {
                match decode_stream_tx(&info, block_time, &self.shared.blacklist) {
                    Ok(parsed) => {
                        self.telemetry.decode_ok.fetch_add(1, Ordering::Relaxed);
                        parsed
                    }
                    Err(DecodeError::MalformedTx(reason)) => {
                        self.telemetry
                            .decode_malformed
                            .fetch_add(1, Ordering::Relaxed);
                        debug!(channel = channel.as_str(), reason, "malformed stream candidate");
                        self.enqueue_fallback_fetch(&info.signature, channel);
                        return;
                    }
                    Err(DecodeError::Uninteresting) => {
                        self.telemetry
                            .decode_uninteresting
                            .fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                    Err(DecodeError::FailedTx) => {
                        self.telemetry
                            .decode_failed_tx
                            .fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                }
            }
            ChannelPayload::Enriched(tx) => {
                match normalize_enriched(&tx, &self.shared.blacklist) {
                    Ok(parsed) => {
                        self.telemetry.decode_ok.fetch_add(1, Ordering::Relaxed);
                        parsed
                    }
                    Err(DecodeError::Uninteresting) => {
                        self.telemetry
                            .decode_uninteresting
                            .fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                    Err(error) => {
                        self.telemetry
                            .decode_malformed
                            .fetch_add(1, Ordering::Relaxed);
                        debug!(channel = channel.as_str(), error = %error, "webhook candidate rejected");
                        return;
                    }
                }
            }
            ChannelPayload::Parsed(parsed) => {
                self.telemetry
                    .fallback_fetch_recovered
                    .fetch_add(1, Ordering::Relaxed);
                *parsed
            }
        };

        let token_mint = parsed.received_mint().unwrap_or_default().to_string();
        if !self.dedup.try_reserve(&parsed.signature, &token_mint) {
            self.telemetry.dedup_dropped.fetch_add(1, Ordering::Relaxed);
            debug!(
                channel = channel.as_str(),
                signature = %parsed.signature,
                "duplicate candidate dropped at dedup"
            );
            return;
        }

        let forwarded = ParsedCandidate {
            tx: parsed,
            channel,
            arrived_at,
        };
        match self.parsed_tx.try_send(forwarded) {
            Ok(()) => {
                self.telemetry
                    .forwarded_to_classifier
                    .fetch_add(1, Ordering::Relaxed);
                self.board.touch(channel);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.telemetry
                    .classifier_queue_dropped
                    .fetch_add(1, Ordering::Relaxed);
                self.board.note_dropped_frame(channel);
                debug!(channel = channel.as_str(), "classifier queue full, candidate dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("classifier channel closed, candidate dropped");
            }
        }
    }

    fn enqueue_fallback_fetch(&self, raw_signature: &[u8], channel: ChannelId) {
        let Some(fetch_tx) = &self.fetch_tx else {
            return;
        };
        if raw_signature.is_empty() {
            return;
        }
        let request = FetchRequest {
            signature: bs58::encode(raw_signature).into_string(),
            channel,
        };
        self.telemetry
            .fallback_fetch_attempts
            .fetch_add(1, Ordering::Relaxed);
        if fetch_tx.try_send(request).is_err() {
            self.telemetry
                .fallback_fetch_failed
                .fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Small worker pool recovering transactions the local decoder gave up
/// on: fetch via the rate-limited pool, parse the jsonParsed response,
/// and re-inject the result as an already-parsed candidate. A saturated
/// pool (`NoHealthyEndpoint`) just drops the signature.
pub fn spawn_fetch_workers(
    workers: usize,
    queue_capacity: usize,
    pool: Arc<EndpointPool>,
    shared: Arc<SharedState>,
    telemetry: Arc<IngestionTelemetry>,
    candidate_tx: mpsc::Sender<Candidate>,
    shutdown: watch::Receiver<bool>,
) -> mpsc::Sender<FetchRequest> {
    let (fetch_tx, fetch_rx) = mpsc::channel::<FetchRequest>(queue_capacity.max(16));
    let fetch_rx = Arc::new(tokio::sync::Mutex::new(fetch_rx));

    for worker_id in 0..workers.max(1) {
        let pool = Arc::clone(&pool);
        let shared = Arc::clone(&shared);
        let telemetry = Arc::clone(&telemetry);
        let candidate_tx = candidate_tx.clone();
        let fetch_rx = Arc::clone(&fetch_rx);
        let mut shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let request = {
                    let mut guard = fetch_rx.lock().await;
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                return;
                            }
                            continue;
                        }
                        request = guard.recv() => request,
                    }
                };
                let Some(request) = request else {
                    debug!(worker_id, "fetch worker exiting, queue closed");
                    return;
                };

                match pool.get_transaction(&request.signature).await {
                    Ok(Some(result)) => match parse_rpc_json(&result, &shared.blacklist) {
                        Ok(parsed) => {
                            let candidate = Candidate {
                                payload: ChannelPayload::Parsed(Box::new(parsed)),
                                arrived_at: Instant::now(),
                                channel: request.channel,
                            };
                            if candidate_tx.try_send(candidate).is_err() {
                                telemetry
                                    .fallback_fetch_failed
                                    .fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        Err(error) => {
                            telemetry
                                .fallback_fetch_failed
                                .fetch_add(1, Ordering::Relaxed);
                            debug!(
                                worker_id,
                                signature = %request.signature,
                                error = %error,
                                "fallback fetch parse failed"
                            );
                        }
                    },
                    Ok(None) => {
                        telemetry
                            .fallback_fetch_failed
                            .fetch_add(1, Ordering::Relaxed);
                    }
                    Err(error) => {
                        telemetry
                            .fallback_fetch_failed
                            .fetch_add(1, Ordering::Relaxed);
                        debug!(
                            worker_id,
                            signature = %request.signature,
                            error = %error,
                            "fallback fetch failed"
                        );
                    }
                }
            }
        });
    }

    fetch_tx
}
