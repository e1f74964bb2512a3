use tracing::debug;
use whalecopy_core_types::{ParsedTx, Platform, WhaleBuy, PUMPSWAP_PROGRAM, RAYDIUM_AMM_PROGRAM};
use whalecopy_state::{Blacklist, WhaleRegistry};

use crate::platform::detect_platform;

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Threshold in SOL against the gross figure (fee included).
    pub min_buy_amount: f64,
    pub time_window_seconds: u64,
    /// Restrict emissions to one platform; ignored when `all_platforms`.
    pub target_platform: Option<Platform>,
    pub all_platforms: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_buy_amount: 0.4,
            time_window_seconds: 300,
            target_platform: None,
            all_platforms: false,
        }
    }
}

/// Why a candidate did not become a WhaleBuy. The order of variants
/// mirrors the decision procedure; `stage()` feeds drop-reason counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    FailedTx,
    NotWhale,
    NotBuy,
    NoToken,
    Blacklisted,
    BelowMin,
    Stale,
    PlatformFiltered,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FailedTx => "failed_tx",
            Self::NotWhale => "not_whale",
            Self::NotBuy => "not_buy",
            Self::NoToken => "no_token",
            Self::Blacklisted => "blacklisted",
            Self::BelowMin => "below_min",
            Self::Stale => "stale",
            Self::PlatformFiltered => "platform_filtered",
        }
    }

    pub fn stage(self) -> &'static str {
        match self {
            Self::FailedTx => "status",
            Self::NotWhale => "whale",
            Self::NotBuy | Self::NoToken | Self::Blacklisted => "swap",
            Self::BelowMin => "amount",
            Self::Stale => "age",
            Self::PlatformFiltered => "platform",
        }
    }
}

/// Decide whether a ParsedTx is a qualifying whale buy. Rules fire in
/// strict order; the first failure drops the candidate with a debug log
/// and never raises. The first-emission check is NOT here: that is the
/// emission gate's atomic reservation.
pub fn classify(
    parsed: &ParsedTx,
    registry: &WhaleRegistry,
    blacklist: &Blacklist,
    config: &ClassifierConfig,
    now_unix: i64,
) -> Result<WhaleBuy, DropReason> {
    if !parsed.succeeded {
        return reject(parsed, DropReason::FailedTx);
    }

    let Some(whale) = registry.get(&parsed.fee_payer) else {
        return reject(parsed, DropReason::NotWhale);
    };

    if !is_buy_transaction(parsed) {
        return reject(parsed, DropReason::NotBuy);
    }

    let Some(swap) = parsed.swap.as_ref().filter(|swap| !swap.token_mint.is_empty()) else {
        return reject(parsed, DropReason::NoToken);
    };
    if blacklist.contains(&swap.token_mint) {
        return reject(parsed, DropReason::Blacklisted);
    }

    let amount_sol = parsed.gross_sol_spent();
    if amount_sol < config.min_buy_amount {
        debug!(
            signature = %parsed.signature,
            amount_sol,
            min = config.min_buy_amount,
            "skip small TX"
        );
        return Err(DropReason::BelowMin);
    }

    // With no block time the signal is assumed real-time.
    let age_seconds = match parsed.block_time {
        Some(block_time) => {
            let age = (now_unix - block_time) as f64;
            if age > config.time_window_seconds as f64 {
                debug!(
                    signature = %parsed.signature,
                    age_seconds = age,
                    window_seconds = config.time_window_seconds,
                    "skip old"
                );
                return Err(DropReason::Stale);
            }
            age.max(0.0)
        }
        None => 0.0,
    };

    let platform = detect_platform(parsed);
    if !config.all_platforms {
        if let Some(target) = config.target_platform {
            if platform != target {
                return reject(parsed, DropReason::PlatformFiltered);
            }
        }
    }

    Ok(WhaleBuy {
        whale_wallet: parsed.fee_payer.clone(),
        token_mint: swap.token_mint.clone(),
        amount_sol,
        signature: parsed.signature.clone(),
        block_time: parsed.block_time,
        age_seconds,
        platform,
        whale_label: whale.label,
    })
}

/// A transaction is a buy when its logs say so, or when the decoded swap
/// direction says the fee payer received tokens for SOL. Pure transfers
/// and close-account transactions match neither.
fn is_buy_transaction(parsed: &ParsedTx) -> bool {
    for log in &parsed.log_messages {
        let lowered = log.to_ascii_lowercase();
        if log.starts_with("Program log: ") && lowered.contains("instruction: buy") {
            return true;
        }
        if lowered.contains("instruction: swap") || lowered.contains("ray_log") {
            return true;
        }
        if (log.contains(PUMPSWAP_PROGRAM) || log.contains(RAYDIUM_AMM_PROGRAM))
            && (lowered.contains("swap") || lowered.contains("buy"))
        {
            return true;
        }
    }
    parsed.swap.as_ref().is_some_and(|swap| swap.is_buy)
}

fn reject(parsed: &ParsedTx, reason: DropReason) -> Result<WhaleBuy, DropReason> {
    debug!(
        signature = %parsed.signature,
        reason = reason.as_str(),
        stage = reason.stage(),
        "candidate dropped"
    );
    Err(reason)
}
