use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::env_parsing::{parse_env_bool, parse_env_csv};
use super::AppConfig;

pub fn load_from_path(path: impl AsRef<Path>) -> Result<AppConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
    Ok(cfg)
}

pub fn load_from_env_or_default(default_path: &Path) -> Result<(AppConfig, PathBuf)> {
    let configured = env::var("WHALECOPY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_path.to_path_buf());
    let mut config = load_from_path(&configured)?;

    if let Some(enabled) = env::var("WHALECOPY_ENABLED").ok().and_then(parse_env_bool) {
        config.whale_copy.enabled = enabled;
    }
    if let Ok(wallets_file) = env::var("WHALECOPY_WALLETS_FILE") {
        let trimmed = wallets_file.trim();
        if !trimmed.is_empty() {
            config.whale_copy.wallets_file = trimmed.to_string();
        }
    }
    if let Some(min_buy_amount) = env::var("WHALECOPY_MIN_BUY_AMOUNT")
        .ok()
        .and_then(|value| value.parse::<f64>().ok())
    {
        config.whale_copy.min_buy_amount = min_buy_amount;
    }
    if let Some(time_window_minutes) = env::var("WHALECOPY_TIME_WINDOW_MINUTES")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        config.whale_copy.time_window_minutes = time_window_minutes;
    }
    if let Ok(target_platform) = env::var("WHALECOPY_TARGET_PLATFORM") {
        config.whale_copy.target_platform = target_platform.trim().to_string();
    }
    if let Some(all_platforms) = env::var("WHALECOPY_ALL_PLATFORMS")
        .ok()
        .and_then(parse_env_bool)
    {
        config.whale_copy.all_platforms = all_platforms;
    }
    if let Ok(extra_mints_csv) = env::var("WHALECOPY_STABLECOIN_FILTER") {
        let values = parse_env_csv(&extra_mints_csv);
        if !values.is_empty() {
            config.whale_copy.stablecoin_filter = values;
        }
    }
    if let Some(port) = env::var("WHALECOPY_WEBHOOK_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        config.webhook.port = port;
    }
    if let Ok(host) = env::var("WHALECOPY_WEBHOOK_HOST") {
        let trimmed = host.trim();
        if !trimmed.is_empty() {
            config.webhook.host = trimmed.to_string();
        }
    }
    if let Some(signature_capacity) = env::var("WHALECOPY_DEDUP_SIGNATURE_CAPACITY")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
    {
        config.dedup.signature_capacity = signature_capacity;
    }
    if let Some(emitted_token_capacity) = env::var("WHALECOPY_DEDUP_EMITTED_TOKEN_CAPACITY")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
    {
        config.dedup.emitted_token_capacity = emitted_token_capacity;
    }
    if let Ok(emitted_tokens_path) = env::var("WHALECOPY_EMITTED_TOKENS_PATH") {
        let trimmed = emitted_tokens_path.trim();
        if !trimmed.is_empty() {
            config.state.emitted_tokens_path = trimmed.to_string();
        }
    }
    if let Ok(history_path) = env::var("WHALECOPY_HISTORY_PATH") {
        let trimmed = history_path.trim();
        if !trimmed.is_empty() {
            config.state.history_path = trimmed.to_string();
        }
    }

    validate(&config)?;

    Ok((config, configured))
}

pub fn validate(config: &AppConfig) -> Result<()> {
    if !config.whale_copy.enabled {
        return Ok(());
    }

    if config.whale_copy.wallets_file.trim().is_empty() {
        return Err(anyhow!(
            "whale_copy.wallets_file must be set when the pipeline is enabled"
        ));
    }
    if !(config.whale_copy.min_buy_amount.is_finite() && config.whale_copy.min_buy_amount >= 0.0) {
        return Err(anyhow!(
            "whale_copy.min_buy_amount must be a non-negative number, got {}",
            config.whale_copy.min_buy_amount
        ));
    }
    if !config.whale_copy.target_platform.trim().is_empty()
        && !matches!(
            config
                .whale_copy
                .target_platform
                .trim()
                .to_ascii_lowercase()
                .as_str(),
            "pump_fun" | "lets_bonk" | "bags" | "pumpswap" | "raydium_amm" | "jupiter"
        )
    {
        return Err(anyhow!(
            "whale_copy.target_platform is not a recognized platform tag: {}",
            config.whale_copy.target_platform
        ));
    }

    let has_grpc = config.grpc_providers().iter().any(|provider| {
        !provider.url.trim().is_empty() && !provider.url.contains("REPLACE_ME")
    });
    if !has_grpc && !config.webhook.enabled {
        return Err(anyhow!(
            "enabled pipeline needs at least one grpc provider in rpc.providers or webhook.enabled"
        ));
    }

    for provider in &config.rpc.providers {
        if provider.url.trim().is_empty() {
            return Err(anyhow!("rpc provider {:?} has an empty url", provider.name));
        }
        if !matches!(
            provider.kind.trim().to_ascii_lowercase().as_str(),
            "http" | "websocket" | "grpc"
        ) {
            return Err(anyhow!(
                "rpc provider {:?} has unknown kind: {}",
                provider.name,
                provider.kind
            ));
        }
        if provider.weight == 0 {
            return Err(anyhow!(
                "rpc provider {:?} must have weight >= 1",
                provider.name
            ));
        }
        if !(provider.rate_limit.is_finite() && provider.rate_limit > 0.0) {
            return Err(anyhow!(
                "rpc provider {:?} must have rate_limit > 0",
                provider.name
            ));
        }
    }

    Ok(())
}
