use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use whalecopy_config::RpcProviderConfig;

pub const MAX_CONSECUTIVE_ERRORS: u32 = 5;
pub const DISABLE_COOLDOWN: Duration = Duration::from_secs(300);
const RATE_LIMIT_BACKOFF_CAP: Duration = Duration::from_secs(60);
const CALL_MAX_ATTEMPTS: usize = 3;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Every endpoint of the requested kind is disabled, backing off or
    /// inside its per-request spacing window. Non-fatal: callers treat it
    /// as a transient miss.
    #[error("no healthy endpoint available")]
    NoHealthyEndpoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    ServerError,
    RateLimited,
    /// Application-level responses such as "not found". These never count
    /// toward the disable threshold.
    Application,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Http,
    WebSocket,
    Grpc,
}

impl ProviderKind {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "websocket" | "ws" | "wss" => Self::WebSocket,
            "grpc" => Self::Grpc,
            _ => Self::Http,
        }
    }
}

#[derive(Debug)]
struct Endpoint {
    name: String,
    url: String,
    kind: ProviderKind,
    weight: u32,
    rate_limit_per_second: f64,
    priority: u32,
    // Runtime state below.
    current_weight: i64,
    consecutive_errors: u32,
    disabled_until: Option<Instant>,
    backoff_until: Option<Instant>,
    last_request_at: Option<Instant>,
    total_requests: u64,
    total_errors: u64,
    rate_limited: u64,
}

impl Endpoint {
    fn from_config(config: &RpcProviderConfig) -> Self {
        Self {
            name: if config.name.trim().is_empty() {
                config.url.clone()
            } else {
                config.name.clone()
            },
            url: config.url.clone(),
            kind: ProviderKind::parse(&config.kind),
            weight: config.weight.max(1),
            rate_limit_per_second: config.rate_limit.max(0.001),
            priority: config.priority,
            current_weight: 0,
            consecutive_errors: 0,
            disabled_until: None,
            backoff_until: None,
            last_request_at: None,
            total_requests: 0,
            total_errors: 0,
            rate_limited: 0,
        }
    }

    fn eligible_at(&self, now: Instant) -> bool {
        if self.disabled_until.is_some_and(|until| until > now) {
            return false;
        }
        if self.backoff_until.is_some_and(|until| until > now) {
            return false;
        }
        match self.last_request_at {
            Some(last) => {
                let min_interval = Duration::from_secs_f64(1.0 / self.rate_limit_per_second);
                now.duration_since(last) >= min_interval
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointSnapshot {
    pub name: String,
    pub kind: ProviderKind,
    pub priority: u32,
    pub weight: u32,
    pub rate_limit_per_second: f64,
    pub consecutive_errors: u32,
    pub disabled: bool,
    pub total_requests: u64,
    pub total_errors: u64,
    pub rate_limited: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub size: usize,
    pub endpoints: Vec<EndpointSnapshot>,
}

/// Weighted, priority-ordered, quota-enforced selection over the
/// configured provider endpoints. Every outbound RPC request in the
/// pipeline is mediated here.
pub struct EndpointPool {
    endpoints: Mutex<Vec<Endpoint>>,
    client: reqwest::Client,
}

impl EndpointPool {
    pub fn from_config(providers: &[RpcProviderConfig], request_timeout_ms: u64) -> Result<Self> {
        let timeout_ms = if request_timeout_ms == 0 {
            DEFAULT_REQUEST_TIMEOUT_MS
        } else {
            request_timeout_ms
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .context("failed building rpc http client")?;
        let endpoints = providers.iter().map(Endpoint::from_config).collect();
        Ok(Self {
            endpoints: Mutex::new(endpoints),
            client,
        })
    }

    /// Pick the best endpoint of `kind` that is eligible now and mark it
    /// as used. Lowest priority wins; ties inside a priority tier resolve
    /// by smooth weighted round-robin, which matches the configured
    /// weight ratios without batching.
    pub fn select(&self, kind: ProviderKind) -> Result<(usize, String), PoolError> {
        self.select_at(kind, Instant::now())
    }

    fn select_at(&self, kind: ProviderKind, now: Instant) -> Result<(usize, String), PoolError> {
        let mut endpoints = self
            .endpoints
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let tier_priority = endpoints
            .iter()
            .filter(|endpoint| endpoint.kind == kind && endpoint.eligible_at(now))
            .map(|endpoint| endpoint.priority)
            .min()
            .ok_or(PoolError::NoHealthyEndpoint)?;

        let tier: Vec<usize> = endpoints
            .iter()
            .enumerate()
            .filter(|(_, endpoint)| {
                endpoint.kind == kind
                    && endpoint.priority == tier_priority
                    && endpoint.eligible_at(now)
            })
            .map(|(index, _)| index)
            .collect();

        let total_weight: i64 = tier
            .iter()
            .map(|&index| endpoints[index].weight as i64)
            .sum();
        let mut winner = tier[0];
        for &index in &tier {
            endpoints[index].current_weight += endpoints[index].weight as i64;
            if endpoints[index].current_weight > endpoints[winner].current_weight {
                winner = index;
            }
        }
        endpoints[winner].current_weight -= total_weight;
        endpoints[winner].last_request_at = Some(now);
        endpoints[winner].total_requests += 1;

        Ok((winner, endpoints[winner].url.clone()))
    }

    pub fn report_success(&self, index: usize) {
        let mut endpoints = self
            .endpoints
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(endpoint) = endpoints.get_mut(index) {
            endpoint.consecutive_errors = 0;
            endpoint.backoff_until = None;
            endpoint.disabled_until = None;
        }
    }

    pub fn report_error(&self, index: usize, kind: ErrorKind) {
        self.report_error_at(index, kind, Instant::now(), None);
    }

    fn report_error_at(
        &self,
        index: usize,
        kind: ErrorKind,
        now: Instant,
        retry_after: Option<Duration>,
    ) {
        if kind == ErrorKind::Application {
            return;
        }
        let mut endpoints = self
            .endpoints
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(endpoint) = endpoints.get_mut(index) else {
            return;
        };
        endpoint.consecutive_errors += 1;
        endpoint.total_errors += 1;

        if kind == ErrorKind::RateLimited {
            endpoint.rate_limited += 1;
            let exp = Duration::from_secs(2u64 << endpoint.consecutive_errors.min(5));
            let backoff = retry_after.unwrap_or(exp).min(RATE_LIMIT_BACKOFF_CAP);
            endpoint.backoff_until = Some(now + backoff);
            warn!(
                endpoint = %endpoint.name,
                backoff_ms = backoff.as_millis() as u64,
                consecutive_errors = endpoint.consecutive_errors,
                "rpc endpoint rate limited"
            );
        }

        if endpoint.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
            endpoint.disabled_until = Some(now + DISABLE_COOLDOWN);
            warn!(
                endpoint = %endpoint.name,
                cooldown_seconds = DISABLE_COOLDOWN.as_secs(),
                "rpc endpoint disabled after consecutive failures"
            );
        }
    }

    /// Execute one JSON-RPC call over the pool. Tries up to three
    /// distinct selections before giving up; every failure is reported to
    /// the endpoint it happened on.
    pub async fn call_rpc(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let mut last_error: Option<anyhow::Error> = None;
        for _ in 0..CALL_MAX_ATTEMPTS {
            let (index, url) = match self.select(ProviderKind::Http) {
                Ok(selected) => selected,
                Err(PoolError::NoHealthyEndpoint) => {
                    return Err(last_error
                        .unwrap_or_else(|| anyhow::Error::from(PoolError::NoHealthyEndpoint)));
                }
            };

            let response = match self.client.post(&url).json(&body).send().await {
                Ok(response) => response,
                Err(error) => {
                    let kind = if error.is_timeout() {
                        ErrorKind::Timeout
                    } else {
                        ErrorKind::ServerError
                    };
                    self.report_error(index, kind);
                    last_error = Some(
                        anyhow::Error::from(error).context(format!("rpc {method} POST failed")),
                    );
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 {
                let retry_after = parse_retry_after(&response);
                self.report_error_at(index, ErrorKind::RateLimited, Instant::now(), retry_after);
                last_error = Some(anyhow::anyhow!("rpc {method} rate limited on {url}"));
                continue;
            }
            if status.is_server_error() {
                self.report_error(index, ErrorKind::ServerError);
                last_error = Some(anyhow::anyhow!("rpc {method} returned {status} on {url}"));
                continue;
            }
            if !status.is_success() {
                // 4xx other than 429 is an application problem, not an
                // endpoint health problem.
                self.report_error(index, ErrorKind::Application);
                return Err(anyhow::anyhow!("rpc {method} returned {status} on {url}"));
            }

            let value: Value = match response.json().await {
                Ok(value) => value,
                Err(error) => {
                    self.report_error(index, ErrorKind::ServerError);
                    last_error = Some(
                        anyhow::Error::from(error)
                            .context(format!("rpc {method} response body unreadable")),
                    );
                    continue;
                }
            };

            self.report_success(index);
            if let Some(error) = value.get("error") {
                debug!(method, error = %error, "rpc returned application error");
            }
            return Ok(value);
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("rpc {method} failed")))
    }

    /// `getTransaction` with jsonParsed encoding, as used by the
    /// decode-fallback fetch path. Returns `None` for null results and
    /// application errors (transaction not indexed yet, pruned, etc.).
    pub async fn get_transaction(&self, signature: &str) -> Result<Option<Value>> {
        let response = self
            .call_rpc(
                "getTransaction",
                json!([
                    signature,
                    {
                        "encoding": "jsonParsed",
                        "commitment": "confirmed",
                        "maxSupportedTransactionVersion": 0
                    }
                ]),
            )
            .await?;

        if response.get("error").is_some() {
            return Ok(None);
        }
        match response.get("result") {
            Some(result) if !result.is_null() => Ok(Some(result.clone())),
            _ => Ok(None),
        }
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let now = Instant::now();
        let endpoints = self
            .endpoints
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        PoolSnapshot {
            size: endpoints.len(),
            endpoints: endpoints
                .iter()
                .map(|endpoint| EndpointSnapshot {
                    name: endpoint.name.clone(),
                    kind: endpoint.kind,
                    priority: endpoint.priority,
                    weight: endpoint.weight,
                    rate_limit_per_second: endpoint.rate_limit_per_second,
                    consecutive_errors: endpoint.consecutive_errors,
                    disabled: endpoint.disabled_until.is_some_and(|until| until > now),
                    total_requests: endpoint.total_requests,
                    total_errors: endpoint.total_errors,
                    rate_limited: endpoint.rate_limited,
                })
                .collect(),
        }
    }
}

fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: &str, kind: &str, weight: u32, rate: f64, priority: u32) -> RpcProviderConfig {
        RpcProviderConfig {
            name: name.to_string(),
            url: format!("https://{name}.example.com"),
            kind: kind.to_string(),
            weight,
            rate_limit: rate,
            priority,
            x_token: String::new(),
        }
    }

    fn pool(providers: &[RpcProviderConfig]) -> EndpointPool {
        EndpointPool::from_config(providers, 5_000).expect("pool")
    }

    #[test]
    fn select_prefers_lowest_priority() {
        let pool = pool(&[
            provider("fallback", "http", 1, 1000.0, 5),
            provider("primary", "http", 1, 1000.0, 0),
        ]);
        let (_, url) = pool.select(ProviderKind::Http).expect("selection");
        assert!(url.contains("primary"));
    }

    #[test]
    fn smooth_weighted_round_robin_matches_weight_ratio() {
        let pool = pool(&[
            provider("heavy", "http", 3, 1_000_000.0, 0),
            provider("light", "http", 1, 1_000_000.0, 0),
        ]);
        let mut heavy = 0;
        let mut light = 0;
        let base = Instant::now();
        for round in 0..400u64 {
            // Step virtual time so the per-second spacing never interferes.
            let now = base + Duration::from_millis(round * 10);
            let (_, url) = pool.select_at(ProviderKind::Http, now).expect("selection");
            if url.contains("heavy") {
                heavy += 1;
            } else {
                light += 1;
            }
        }
        assert_eq!(heavy, 300);
        assert_eq!(light, 100);
    }

    #[test]
    fn per_second_quota_blocks_back_to_back_selection() {
        let pool = pool(&[provider("slow", "http", 1, 2.0, 0)]);
        let base = Instant::now();
        pool.select_at(ProviderKind::Http, base).expect("first");
        assert!(matches!(
            pool.select_at(ProviderKind::Http, base + Duration::from_millis(100)),
            Err(PoolError::NoHealthyEndpoint)
        ));
        pool.select_at(ProviderKind::Http, base + Duration::from_millis(500))
            .expect("after spacing window");
    }

    #[test]
    fn endpoint_disables_after_consecutive_errors_and_recovers() {
        let pool = pool(&[provider("flaky", "http", 1, 1_000_000.0, 0)]);
        let base = Instant::now();
        let (index, _) = pool.select_at(ProviderKind::Http, base).expect("selection");
        for _ in 0..MAX_CONSECUTIVE_ERRORS {
            pool.report_error_at(index, ErrorKind::ServerError, base, None);
        }
        assert!(matches!(
            pool.select_at(ProviderKind::Http, base + Duration::from_secs(1)),
            Err(PoolError::NoHealthyEndpoint)
        ));

        // Past the cooldown the endpoint is eligible again without probing.
        let after_cooldown = base + DISABLE_COOLDOWN + Duration::from_secs(1);
        let (index, _) = pool
            .select_at(ProviderKind::Http, after_cooldown)
            .expect("re-eligible after cooldown");
        pool.report_success(index);
        assert_eq!(pool.snapshot().endpoints[0].consecutive_errors, 0);
    }

    #[test]
    fn application_errors_do_not_count_toward_disable() {
        let pool = pool(&[provider("stable", "http", 1, 1_000_000.0, 0)]);
        let base = Instant::now();
        let (index, _) = pool.select_at(ProviderKind::Http, base).expect("selection");
        for _ in 0..20 {
            pool.report_error_at(index, ErrorKind::Application, base, None);
        }
        pool.select_at(ProviderKind::Http, base + Duration::from_secs(1))
            .expect("still eligible");
    }

    #[test]
    fn disabled_endpoint_falls_back_to_next_priority() {
        let pool = pool(&[
            provider("primary", "http", 1, 1_000_000.0, 0),
            provider("fallback", "http", 1, 1_000_000.0, 5),
        ]);
        let base = Instant::now();
        let (index, url) = pool.select_at(ProviderKind::Http, base).expect("selection");
        assert!(url.contains("primary"));
        for _ in 0..MAX_CONSECUTIVE_ERRORS {
            pool.report_error_at(index, ErrorKind::Timeout, base, None);
        }
        let (_, url) = pool
            .select_at(ProviderKind::Http, base + Duration::from_secs(1))
            .expect("fallback selection");
        assert!(url.contains("fallback"));
    }

    #[test]
    fn kind_filter_never_returns_grpc_for_http_requests() {
        let pool = pool(&[provider("stream", "grpc", 1, 1_000_000.0, 0)]);
        assert!(matches!(
            pool.select(ProviderKind::Http),
            Err(PoolError::NoHealthyEndpoint)
        ));
    }

    #[test]
    fn snapshot_reports_pool_shape() {
        let pool = pool(&[
            provider("a", "http", 2, 10.0, 0),
            provider("b", "grpc", 1, 5.0, 1),
        ]);
        let snapshot = pool.snapshot();
        assert_eq!(snapshot.size, 2);
        assert_eq!(snapshot.endpoints[0].weight, 2);
        assert_eq!(snapshot.endpoints[1].kind, ProviderKind::Grpc);
    }
}
