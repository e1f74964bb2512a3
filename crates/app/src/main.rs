mod executor;

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use whalecopy_config::{load_from_env_or_default, AppConfig};
use whalecopy_core_types::{ChannelId, Platform};
use whalecopy_emission::{EmissionGate, TradeExecutor};
use whalecopy_ingestion::{
    spawn_fetch_workers, GrpcIngress, HealthBoard, Ingress, IngestionTelemetry, ParsedCandidate,
    SignalDedup, Supervisor, Watchdog, WebhookIngress,
};
use whalecopy_rpc::EndpointPool;
use whalecopy_signals::{classify, resolve, ClassifierConfig, Sha256Deriver};
use whalecopy_state::{unix_now_seconds, Blacklist, SharedState, WhaleRegistry};

use crate::executor::PaperExecutor;

const DEFAULT_CONFIG_PATH: &str = "configs/dev.toml";
const SHUTDOWN_BUDGET: Duration = Duration::from_secs(15);
const EMISSION_LATENCY_ALARM: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    let cli_config = parse_config_arg();
    let default_path = cli_config.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    // Any configuration problem is exit code 1, via the Err return.
    let (config, loaded_config_path) = load_from_env_or_default(&default_path)?;

    init_tracing(&config.system.log_level, config.system.log_json);
    info!(
        config_path = %loaded_config_path.display(),
        "configuration loaded"
    );

    if !config.whale_copy.enabled {
        info!("whale_copy.enabled is false, nothing to do");
        return Ok(());
    }

    let registry = WhaleRegistry::load(&config.whale_copy.wallets_file)
        .context("failed loading whale registry")?;
    if registry.is_empty() {
        warn!("whale registry is empty, the pipeline will not emit anything");
    }
    let blacklist = Blacklist::with_extra(config.whale_copy.stablecoin_filter.clone());

    let shared = match SharedState::load(
        registry,
        blacklist,
        &config.state.emitted_tokens_path,
        &config.state.history_path,
        config.dedup.emitted_token_capacity,
    ) {
        Ok(shared) => Arc::new(shared),
        // Parse corruption recovers to an empty set inside load; an error
        // here means the files are unreadable at the I/O level even via
        // the backup. That is the one unrecoverable startup condition.
        Err(load_error) => {
            error!(error = %load_error, "persistent state unreadable beyond backup");
            std::process::exit(2);
        }
    };

    let pool = Arc::new(
        EndpointPool::from_config(&config.rpc.providers, config.rpc.request_timeout_ms)
            .context("failed building rpc endpoint pool")?,
    );
    run_pipeline(config, shared, pool).await
}

async fn run_pipeline(
    config: AppConfig,
    shared: Arc<SharedState>,
    pool: Arc<EndpointPool>,
) -> Result<()> {
    let board = Arc::new(HealthBoard::new());
    let telemetry = Arc::new(IngestionTelemetry::default());
    let dedup = Arc::new(SignalDedup::new(config.dedup.signature_capacity));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (mut supervisor, handles) = Supervisor::new(
        config.stream.queue_capacity,
        Arc::clone(&dedup),
        Arc::clone(&shared),
        Arc::clone(&board),
        Arc::clone(&telemetry),
        None,
        shutdown_rx.clone(),
    );
    if !config.http_providers().is_empty() {
        let fetch_tx = spawn_fetch_workers(
            config.stream.fetch_workers,
            config.stream.fetch_queue_capacity,
            Arc::clone(&pool),
            Arc::clone(&shared),
            Arc::clone(&telemetry),
            handles.candidate_tx.clone(),
            shutdown_rx.clone(),
        );
        supervisor.set_fetch_tx(fetch_tx);
    }

    let wallets = shared.registry.wallets();
    let mut channels: Vec<Box<dyn Ingress>> = Vec::new();
    let grpc_slots = [ChannelId::GrpcPrimary, ChannelId::GrpcSecondary];
    let grpc_providers: Vec<_> = config
        .grpc_providers()
        .into_iter()
        .take(grpc_slots.len())
        .cloned()
        .collect();
    for (slot, provider) in grpc_slots.iter().zip(grpc_providers.iter()) {
        let mut ingress = GrpcIngress::new(
            *slot,
            provider.url.clone(),
            provider.x_token.clone(),
            wallets.clone(),
            config.stream.clone(),
            Arc::clone(&board),
            Arc::clone(&telemetry),
        );
        ingress.start(handles.candidate_tx.clone())?;
        channels.push(Box::new(ingress));
    }
    if config.webhook.enabled {
        let mut ingress = WebhookIngress::new(
            config.webhook.clone(),
            Arc::clone(&board),
            Arc::clone(&telemetry),
            Arc::clone(&dedup),
            Arc::clone(&pool),
            Arc::clone(&shared),
        );
        ingress.start(handles.candidate_tx.clone())?;
        channels.push(Box::new(ingress));
    }
    if channels.is_empty() {
        anyhow::bail!("no ingress channel could be started");
    }
    info!(
        channels = channels.len(),
        whales = shared.registry.len(),
        "whale-copy pipeline started"
    );

    #[cfg(unix)]
    {
        // SIGHUP is the admin reload for the whale registry document.
        let shared = Arc::clone(&shared);
        if let Ok(mut hangup) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        {
            tokio::spawn(async move {
                while hangup.recv().await.is_some() {
                    match shared.registry.reload() {
                        Ok(count) => info!(whales = count, "whale registry reloaded on SIGHUP"),
                        Err(reload_error) => {
                            warn!(error = %reload_error, "whale registry reload failed")
                        }
                    }
                }
            });
        }
    }

    let supervisor_task = tokio::spawn(supervisor.run());
    let watchdog_task = tokio::spawn(
        Watchdog::new(
            Arc::clone(&board),
            config.watchdog.clone(),
            shutdown_rx.clone(),
        )
        .run(),
    );

    let classifier_config = ClassifierConfig {
        min_buy_amount: config.whale_copy.min_buy_amount,
        time_window_seconds: config.time_window_seconds(),
        target_platform: Platform::parse(&config.whale_copy.target_platform),
        all_platforms: config.whale_copy.all_platforms,
    };
    let deriver = Sha256Deriver;
    let gate = EmissionGate::new(Arc::clone(&shared));
    let trade_executor = PaperExecutor;

    let mut parsed_rx = handles.parsed_rx;
    let mut report_interval = time::interval(Duration::from_secs(
        config.stream.telemetry_report_seconds.max(5),
    ));
    report_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut drop_counts: BTreeMap<&'static str, u64> = BTreeMap::new();
    let mut drop_stage_counts: BTreeMap<&'static str, u64> = BTreeMap::new();

    loop {
        tokio::select! {
            candidate = parsed_rx.recv() => {
                let Some(candidate) = candidate else {
                    warn!("classifier channel closed");
                    break;
                };
                handle_parsed_candidate(
                    candidate,
                    &shared,
                    &classifier_config,
                    &deriver,
                    &gate,
                    &trade_executor,
                    &mut drop_counts,
                    &mut drop_stage_counts,
                )
                .await;
            }
            _ = report_interval.tick() => {
                telemetry.maybe_report(config.stream.telemetry_report_seconds);
                if !drop_counts.is_empty() {
                    info!(
                        drop_counts = ?drop_counts,
                        drop_stage_counts = ?drop_stage_counts,
                        "classification drop reasons"
                    );
                    drop_counts.clear();
                    drop_stage_counts.clear();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    for channel in &channels {
        channel.stop();
    }
    if time::timeout(SHUTDOWN_BUDGET, supervisor_task).await.is_err() {
        warn!("supervisor did not drain within the shutdown budget");
    }
    watchdog_task.abort();
    shared.flush().await.context("failed flushing state")?;
    info!("clean shutdown");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_parsed_candidate<E: TradeExecutor>(
    candidate: ParsedCandidate,
    shared: &Arc<SharedState>,
    classifier_config: &ClassifierConfig,
    deriver: &Sha256Deriver,
    gate: &EmissionGate,
    trade_executor: &E,
    drop_counts: &mut BTreeMap<&'static str, u64>,
    drop_stage_counts: &mut BTreeMap<&'static str, u64>,
) {
    let buy = match classify(
        &candidate.tx,
        &shared.registry,
        &shared.blacklist,
        classifier_config,
        unix_now_seconds(),
    ) {
        Ok(buy) => buy,
        Err(reason) => {
            *drop_counts.entry(reason.as_str()).or_insert(0) += 1;
            *drop_stage_counts.entry(reason.stage()).or_insert(0) += 1;
            return;
        }
    };

    let intent = resolve(buy, &candidate.tx, deriver);
    match gate.emit(intent, trade_executor).await {
        Ok(outcome) => {
            let latency = candidate.arrived_at.elapsed();
            if latency > EMISSION_LATENCY_ALARM {
                warn!(
                    latency_ms = latency.as_millis() as u64,
                    budget_ms = EMISSION_LATENCY_ALARM.as_millis() as u64,
                    "signal-to-emission latency exceeded budget"
                );
            }
            info!(
                channel = candidate.channel.as_str(),
                latency_ms = latency.as_millis() as u64,
                bought = outcome.is_bought(),
                "emission completed"
            );
        }
        Err(gate_drop) => {
            *drop_counts.entry(gate_drop.as_str()).or_insert(0) += 1;
            *drop_stage_counts.entry("emission").or_insert(0) += 1;
        }
    }
}

fn parse_config_arg() -> Option<PathBuf> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(inline) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(inline));
        }
    }
    None
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    if json {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
