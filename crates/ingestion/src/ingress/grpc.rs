use futures_util::{SinkExt, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tonic::transport::ClientTlsConfig;
use tracing::{debug, info, warn};
use whalecopy_config::StreamConfig;
use whalecopy_core_types::{ChannelHealthRecord, ChannelId, ChannelState};
use yellowstone_grpc_client::GeyserGrpcClient;
use yellowstone_grpc_proto::prelude::{
    subscribe_update, CommitmentLevel, SubscribeRequest, SubscribeRequestFilterTransactions,
    SubscribeRequestPing, SubscribeUpdate,
};

use super::Ingress;
use crate::health::HealthBoard;
use crate::telemetry::IngestionTelemetry;
use crate::{Candidate, ChannelPayload};

/// Binary-stream ingress: one long-lived yellowstone subscription per
/// provider, filtered to transactions mentioning any tracked wallet. Two
/// instances run against independent providers; the supervisor
/// deduplicates across them.
pub struct GrpcIngress {
    channel: ChannelId,
    endpoint: String,
    x_token: String,
    wallets: Vec<String>,
    config: StreamConfig,
    board: Arc<HealthBoard>,
    telemetry: Arc<IngestionTelemetry>,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl GrpcIngress {
    pub fn new(
        channel: ChannelId,
        endpoint: impl Into<String>,
        x_token: impl Into<String>,
        wallets: Vec<String>,
        config: StreamConfig,
        board: Arc<HealthBoard>,
        telemetry: Arc<IngestionTelemetry>,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            channel,
            endpoint: endpoint.into(),
            x_token: x_token.into(),
            wallets,
            config,
            board,
            telemetry,
            stop_tx,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Ingress for GrpcIngress {
    fn start(&mut self, sink: mpsc::Sender<Candidate>) -> anyhow::Result<()> {
        if self.endpoint.trim().is_empty() {
            anyhow::bail!("grpc ingress {} has no endpoint", self.channel.as_str());
        }
        let runtime = StreamRuntime {
            channel: self.channel,
            endpoint: self.endpoint.clone(),
            x_token: self.x_token.clone(),
            wallets: self.wallets.iter().cloned().collect(),
            config: self.config.clone(),
            board: Arc::clone(&self.board),
            telemetry: Arc::clone(&self.telemetry),
        };
        let stop_rx = self.stop_tx.subscribe();
        self.task = Some(tokio::spawn(async move {
            stream_loop(runtime, sink, stop_rx).await;
        }));
        Ok(())
    }

    fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    fn health(&self) -> ChannelHealthRecord {
        self.board.record(self.channel)
    }
}

struct StreamRuntime {
    channel: ChannelId,
    endpoint: String,
    x_token: String,
    wallets: HashSet<String>,
    config: StreamConfig,
    board: Arc<HealthBoard>,
    telemetry: Arc<IngestionTelemetry>,
}

enum DisconnectClass {
    /// RST_STREAM and friends: the provider dropped the stream but is
    /// healthy. Reconnect fast, latency is the product.
    Reset,
    /// Anything else: back off exponentially up to the cap.
    Other,
}

async fn stream_loop(
    runtime: StreamRuntime,
    sink: mpsc::Sender<Candidate>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut next_backoff_ms = runtime.config.backoff_initial_ms.max(100);
    info!(
        channel = runtime.channel.as_str(),
        endpoint = %runtime.endpoint,
        wallets = runtime.wallets.len(),
        "grpc ingress starting"
    );

    loop {
        if *stop_rx.borrow() {
            break;
        }

        let connected_at = Instant::now();
        let disconnect = run_subscription(&runtime, &sink, &mut stop_rx).await;
        if *stop_rx.borrow() {
            break;
        }

        runtime.board.note_reconnect(runtime.channel);
        runtime
            .board
            .set_state(runtime.channel, ChannelState::Degraded);
        if connected_at.elapsed() < Duration::from_secs(runtime.config.fast_close_seconds) {
            runtime.board.note_fast_close(runtime.channel);
        }

        let delay = match disconnect {
            DisconnectClass::Reset => {
                next_backoff_ms = runtime.config.backoff_initial_ms.max(100);
                Duration::from_millis(runtime.config.reset_reconnect_ms.max(100))
            }
            DisconnectClass::Other => {
                let delay = next_backoff_ms.clamp(
                    runtime.config.backoff_initial_ms.max(100),
                    runtime.config.backoff_max_ms.max(1_000),
                );
                next_backoff_ms = delay
                    .saturating_mul(2)
                    .min(runtime.config.backoff_max_ms.max(1_000));
                Duration::from_millis(delay)
            }
        };

        tokio::select! {
            _ = time::sleep(delay) => {}
            _ = stop_rx.changed() => break,
        }
    }

    runtime
        .board
        .set_state(runtime.channel, ChannelState::Disabled);
    info!(channel = runtime.channel.as_str(), "grpc ingress stopped");
}

async fn run_subscription(
    runtime: &StreamRuntime,
    sink: &mpsc::Sender<Candidate>,
    stop_rx: &mut watch::Receiver<bool>,
) -> DisconnectClass {
    runtime
        .board
        .set_state(runtime.channel, ChannelState::Connecting);

    let builder = match GeyserGrpcClient::build_from_shared(runtime.endpoint.clone()) {
        Ok(builder) => builder,
        Err(error) => {
            warn!(channel = runtime.channel.as_str(), error = %error, "invalid stream endpoint");
            return DisconnectClass::Other;
        }
    };
    let builder = match builder.x_token(Some(runtime.x_token.as_str())) {
        Ok(builder) => builder,
        Err(error) => {
            warn!(channel = runtime.channel.as_str(), error = %error, "invalid stream x-token");
            return DisconnectClass::Other;
        }
    };
    let builder = if runtime
        .endpoint
        .trim()
        .to_ascii_lowercase()
        .starts_with("https://")
    {
        match builder.tls_config(ClientTlsConfig::new().with_native_roots()) {
            Ok(builder) => builder,
            Err(error) => {
                warn!(channel = runtime.channel.as_str(), error = ?error, "invalid stream TLS config");
                return DisconnectClass::Other;
            }
        }
    } else {
        builder
    };

    let mut client = match builder
        .connect_timeout(Duration::from_millis(runtime.config.connect_timeout_ms.max(500)))
        .http2_adaptive_window(true)
        .tcp_nodelay(true)
        .connect()
        .await
    {
        Ok(client) => client,
        Err(error) => {
            warn!(channel = runtime.channel.as_str(), error = ?error, "stream connect failed");
            return DisconnectClass::Other;
        }
    };

    let (mut subscribe_tx, mut stream) = match client.subscribe().await {
        Ok(parts) => parts,
        Err(error) => {
            warn!(channel = runtime.channel.as_str(), error = %error, "stream subscribe failed");
            return DisconnectClass::Other;
        }
    };
    if let Err(error) = subscribe_tx
        .send(build_subscribe_request(&runtime.wallets))
        .await
    {
        warn!(channel = runtime.channel.as_str(), error = %error, "stream subscribe request failed");
        return DisconnectClass::Other;
    }
    info!(
        channel = runtime.channel.as_str(),
        "stream subscribed for tracked wallets"
    );

    let mut keepalive = time::interval(Duration::from_secs(
        runtime.config.keepalive_ping_seconds.max(1),
    ));
    keepalive.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
    let idle_timeout = Duration::from_secs(runtime.config.idle_timeout_seconds.max(5));

    loop {
        tokio::select! {
            _ = stop_rx.changed() => return DisconnectClass::Other,
            _ = keepalive.tick() => {
                let ping = SubscribeRequest {
                    ping: Some(SubscribeRequestPing { id: 1 }),
                    ..SubscribeRequest::default()
                };
                if let Err(error) = subscribe_tx.send(ping).await {
                    warn!(channel = runtime.channel.as_str(), error = %error, "keepalive ping failed");
                    return classify_error_text(&error.to_string());
                }
            }
            next = time::timeout(idle_timeout, stream.next()) => {
                match next {
                    Ok(Some(Ok(update))) => {
                        if let Some(class) = handle_update(runtime, sink, &mut subscribe_tx, update).await {
                            return class;
                        }
                    }
                    Ok(Some(Err(status))) => {
                        warn!(channel = runtime.channel.as_str(), error = %status, "stream update error");
                        return classify_error_text(&status.to_string());
                    }
                    Ok(None) => {
                        warn!(channel = runtime.channel.as_str(), "stream ended");
                        return DisconnectClass::Other;
                    }
                    Err(_) => {
                        warn!(
                            channel = runtime.channel.as_str(),
                            idle_timeout_seconds = runtime.config.idle_timeout_seconds,
                            "stream idle timeout"
                        );
                        return DisconnectClass::Other;
                    }
                }
            }
        }
    }
}

/// Returns Some(class) when the subscription must be torn down.
async fn handle_update<S>(
    runtime: &StreamRuntime,
    sink: &mpsc::Sender<Candidate>,
    subscribe_tx: &mut S,
    update: SubscribeUpdate,
) -> Option<DisconnectClass>
where
    S: futures_util::Sink<SubscribeRequest> + Unpin,
    S::Error: std::fmt::Display,
{
    let block_time = update.created_at.as_ref().map(|stamp| stamp.seconds);
    match update.update_oneof {
        Some(subscribe_update::UpdateOneof::Transaction(tx_update)) => {
            runtime
                .telemetry
                .stream_messages_seen
                .fetch_add(1, Ordering::Relaxed);
            let Some(info) = tx_update.transaction else {
                return None;
            };
            if info.is_vote {
                return None;
            }
            // Fast local filter: only transactions whose fee payer is a
            // tracked wallet go any further. Transfers TO a whale mention
            // the wallet too and must not survive here.
            let is_whale_fee_payer = info
                .transaction
                .as_ref()
                .and_then(|tx| tx.message.as_ref())
                .and_then(|message| message.account_keys.first())
                .map(|raw| runtime.wallets.contains(&bs58::encode(raw).into_string()))
                .unwrap_or(false);
            if !is_whale_fee_payer {
                return None;
            }

            let candidate = Candidate {
                payload: ChannelPayload::Stream {
                    info: Box::new(info),
                    block_time,
                },
                arrived_at: Instant::now(),
                channel: runtime.channel,
            };
            match sink.try_send(candidate) {
                Ok(()) => {
                    runtime.board.touch(runtime.channel);
                    runtime
                        .telemetry
                        .candidates_enqueued
                        .fetch_add(1, Ordering::Relaxed);
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // Never block the network read loop on a full sink.
                    runtime.board.note_dropped_frame(runtime.channel);
                    runtime
                        .telemetry
                        .candidates_dropped_full_sink
                        .fetch_add(1, Ordering::Relaxed);
                    debug!(channel = runtime.channel.as_str(), "sink full, candidate dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(channel = runtime.channel.as_str(), "sink closed, stopping stream");
                    return Some(DisconnectClass::Other);
                }
            }
            None
        }
        Some(subscribe_update::UpdateOneof::Ping(_)) => {
            // Server pings are answered immediately.
            let pong = SubscribeRequest {
                ping: Some(SubscribeRequestPing { id: 1 }),
                ..SubscribeRequest::default()
            };
            if let Err(error) = subscribe_tx.send(pong).await {
                warn!(channel = runtime.channel.as_str(), error = %error, "pong failed");
                return Some(classify_error_text(&error.to_string()));
            }
            runtime.board.touch(runtime.channel);
            None
        }
        _ => None,
    }
}

fn build_subscribe_request(wallets: &HashSet<String>) -> SubscribeRequest {
    let mut transactions = HashMap::new();
    transactions.insert(
        "whale-buys".to_string(),
        SubscribeRequestFilterTransactions {
            vote: Some(false),
            failed: Some(false),
            signature: None,
            account_include: wallets.iter().cloned().collect(),
            account_exclude: Vec::new(),
            account_required: Vec::new(),
        },
    );
    SubscribeRequest {
        transactions,
        commitment: Some(CommitmentLevel::Processed as i32),
        ..SubscribeRequest::default()
    }
}

fn classify_error_text(text: &str) -> DisconnectClass {
    let lowered = text.to_ascii_lowercase();
    if lowered.contains("rst_stream")
        || lowered.contains("stream reset")
        || lowered.contains("go_away")
        || lowered.contains("goaway")
        || lowered.contains("broken pipe")
    {
        DisconnectClass::Reset
    } else {
        DisconnectClass::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_request_filters_to_tracked_wallets_without_votes() {
        let wallets: HashSet<String> =
            ["WalletA".to_string(), "WalletB".to_string()].into_iter().collect();
        let request = build_subscribe_request(&wallets);
        let filter = request.transactions.get("whale-buys").expect("filter");
        assert_eq!(filter.vote, Some(false));
        assert_eq!(filter.failed, Some(false));
        assert_eq!(filter.account_include.len(), 2);
        assert_eq!(request.commitment, Some(CommitmentLevel::Processed as i32));
    }

    #[test]
    fn reset_class_errors_take_the_fast_reconnect_path() {
        assert!(matches!(
            classify_error_text("h2 protocol error: RST_STREAM received"),
            DisconnectClass::Reset
        ));
        assert!(matches!(
            classify_error_text("connection closed: GOAWAY"),
            DisconnectClass::Reset
        ));
        assert!(matches!(
            classify_error_text("dns resolution failed"),
            DisconnectClass::Other
        ));
    }
}
