use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub system: SystemConfig,
    pub whale_copy: WhaleCopyConfig,
    pub rpc: RpcConfig,
    pub webhook: WebhookConfig,
    pub dedup: DedupConfig,
    pub stream: StreamConfig,
    pub state: StateConfig,
    pub watchdog: WatchdogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub log_level: String,
    pub log_json: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WhaleCopyConfig {
    pub enabled: bool,
    pub wallets_file: String,
    /// Threshold in SOL against the gross figure the whale paid.
    pub min_buy_amount: f64,
    pub time_window_minutes: u64,
    /// Restrict emissions to one platform tag; empty means no restriction.
    pub target_platform: String,
    /// When true, `target_platform` is ignored.
    #[serde(alias = "whale_all_platforms")]
    pub all_platforms: bool,
    /// Extra token mints to blacklist on top of the built-in set. The
    /// built-in set can never be subtracted from.
    #[serde(alias = "stablecoin_filter")]
    pub stablecoin_filter: Vec<String>,
}

impl Default for WhaleCopyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wallets_file: "data/whale_wallets.json".to_string(),
            min_buy_amount: 0.4,
            time_window_minutes: 5,
            target_platform: String::new(),
            all_platforms: false,
            stablecoin_filter: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RpcConfig {
    pub providers: Vec<RpcProviderConfig>,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RpcProviderConfig {
    pub name: String,
    pub url: String,
    /// "http", "websocket" or "grpc".
    pub kind: String,
    /// Relative traffic share inside a priority tier.
    pub weight: u32,
    /// Requests per second.
    pub rate_limit: f64,
    /// Lower is preferred.
    pub priority: u32,
    /// Auth token for grpc stream providers.
    pub x_token: String,
}

impl Default for RpcProviderConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            url: String::new(),
            kind: "http".to_string(),
            weight: 1,
            rate_limit: 1.0,
            priority: 1,
            x_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub body_timeout_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8000,
            body_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub signature_capacity: usize,
    pub emitted_token_capacity: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            signature_capacity: 5_000,
            emitted_token_capacity: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub connect_timeout_ms: u64,
    pub keepalive_ping_seconds: u64,
    /// Fixed reconnect delay for reset-stream errors. Latency is the
    /// product, so this path does not back off.
    pub reset_reconnect_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub idle_timeout_seconds: u64,
    /// A connection that dies this quickly after connecting counts as a
    /// fast close.
    pub fast_close_seconds: u64,
    /// Supervisor input and classifier channel bound.
    pub queue_capacity: usize,
    pub fetch_workers: usize,
    pub fetch_queue_capacity: usize,
    pub telemetry_report_seconds: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            keepalive_ping_seconds: 10,
            reset_reconnect_ms: 500,
            backoff_initial_ms: 1_000,
            backoff_max_ms: 30_000,
            idle_timeout_seconds: 45,
            fast_close_seconds: 5,
            queue_capacity: 1_024,
            fetch_workers: 2,
            fetch_queue_capacity: 256,
            telemetry_report_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub emitted_tokens_path: String,
    pub history_path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            emitted_tokens_path: "data/emitted_tokens.json".to_string(),
            history_path: "data/purchased_history.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub silence_alert_seconds: u64,
    pub check_interval_seconds: u64,
    pub alert_repeat_seconds: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            silence_alert_seconds: 300,
            check_interval_seconds: 30,
            alert_repeat_seconds: 60,
        }
    }
}

impl AppConfig {
    pub fn time_window_seconds(&self) -> u64 {
        self.whale_copy.time_window_minutes * 60
    }

    pub fn grpc_providers(&self) -> Vec<&RpcProviderConfig> {
        self.rpc
            .providers
            .iter()
            .filter(|provider| provider.kind.trim().eq_ignore_ascii_case("grpc"))
            .collect()
    }

    pub fn http_providers(&self) -> Vec<&RpcProviderConfig> {
        self.rpc
            .providers
            .iter()
            .filter(|provider| provider.kind.trim().eq_ignore_ascii_case("http"))
            .collect()
    }
}
