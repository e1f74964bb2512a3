use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Base fee per signature in lamports. Used for reporting only; the buy
/// threshold compares the gross figure including the fee.
pub const BASE_FEE_LAMPORTS_PER_SIGNATURE: u64 = 5_000;

pub const PUMP_FUN_PROGRAM: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";
pub const LETS_BONK_PROGRAM: &str = "LanMV9sAd7wArD4vJFi2qDdfnVhFxYSUg6eADduJ3uj";
pub const BAGS_PROGRAM: &str = "dbcij3LWUppWqq96dh6gJWwBifmcGfLSB5D4DuSMaqN";
pub const PUMPSWAP_PROGRAM: &str = "PSwapMdSai8tjrEXcxFeQth87xC4rRsa4VA5mhGhXkP";
pub const RAYDIUM_AMM_PROGRAM: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
pub const JUPITER_PROGRAMS: [&str; 3] = [
    "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4",
    "JUP4Fb2cqiRUcaTHdrPC8h2gNsA2ETXiPDD33WcGuJB",
    "JUP2jxvXaqu7NQY1GmNF4m1vodw12LVXYxbFL2uN9oQp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    PumpFun,
    LetsBonk,
    Bags,
    PumpSwap,
    RaydiumAmm,
    Jupiter,
    Unknown,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PumpFun => "pump_fun",
            Self::LetsBonk => "lets_bonk",
            Self::Bags => "bags",
            Self::PumpSwap => "pumpswap",
            Self::RaydiumAmm => "raydium_amm",
            Self::Jupiter => "jupiter",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_program_id(program_id: &str) -> Option<Self> {
        match program_id {
            PUMP_FUN_PROGRAM => Some(Self::PumpFun),
            LETS_BONK_PROGRAM => Some(Self::LetsBonk),
            BAGS_PROGRAM => Some(Self::Bags),
            PUMPSWAP_PROGRAM => Some(Self::PumpSwap),
            RAYDIUM_AMM_PROGRAM => Some(Self::RaydiumAmm),
            id if JUPITER_PROGRAMS.contains(&id) => Some(Self::Jupiter),
            _ => None,
        }
    }

    /// Launchpad signals carry richer structure and usually represent
    /// first-buys; they win over AMM matches on the same transaction.
    pub fn is_launchpad(self) -> bool {
        matches!(self, Self::PumpFun | Self::LetsBonk | Self::Bags)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pump_fun" | "pumpfun" => Some(Self::PumpFun),
            "lets_bonk" | "letsbonk" | "bonk" => Some(Self::LetsBonk),
            "bags" => Some(Self::Bags),
            "pumpswap" => Some(Self::PumpSwap),
            "raydium_amm" | "raydium" => Some(Self::RaydiumAmm),
            "jupiter" => Some(Self::Jupiter),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub owner: String,
    pub mint: String,
    pub ui_amount: f64,
}

/// Accounts observed in the whale's own launchpad instruction. When
/// present they beat derived addresses, since they reflect what the chain
/// actually used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchpadAccounts {
    pub fee_recipient: String,
    pub associated_bonding_curve: String,
    pub token_program: String,
    pub creator_vault: String,
}

/// Decoder verdict about the swap inside a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapDetails {
    pub token_mint: String,
    pub token_amount: f64,
    pub is_buy: bool,
    /// Gross lamports spent by the fee payer, in SOL, fee included. This
    /// is the figure the buy threshold compares against.
    pub gross_sol_spent: f64,
    /// SOL amount reported by a launchpad trade event, when one was
    /// decoded. Reporting only.
    pub event_sol_amount: Option<f64>,
    pub launchpad_accounts: Option<LaunchpadAccounts>,
}

/// Neutral view of a decoded transaction. Produced locally by the decoder
/// for stream candidates, by the webhook normalizer for enriched
/// candidates, and by the RPC-json parser for fallback fetches.
///
/// Invariant: `pre_balances`, `post_balances` and `account_keys` have the
/// same length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTx {
    pub signature: String,
    pub block_time: Option<i64>,
    pub fee_payer: String,
    pub account_keys: Vec<String>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub token_post_balances: Vec<TokenBalance>,
    pub log_messages: Vec<String>,
    pub succeeded: bool,
    pub invoked_program_ids: BTreeSet<String>,
    pub swap: Option<SwapDetails>,
    /// Source hint from enriched payloads ("pump", "jupiter", ...).
    pub platform_hint: Option<String>,
}

impl ParsedTx {
    pub fn received_mint(&self) -> Option<&str> {
        self.swap.as_ref().map(|swap| swap.token_mint.as_str())
    }

    /// Gross SOL the fee payer spent, fee included.
    pub fn gross_sol_spent(&self) -> f64 {
        match (self.pre_balances.first(), self.post_balances.first()) {
            (Some(pre), Some(post)) => pre.saturating_sub(*post) as f64 / LAMPORTS_PER_SOL,
            _ => 0.0,
        }
    }
}

/// Raw qualifying signal, as produced by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleBuy {
    pub whale_wallet: String,
    pub token_mint: String,
    pub amount_sol: f64,
    pub signature: String,
    pub block_time: Option<i64>,
    pub age_seconds: f64,
    pub platform: Platform,
    pub whale_label: String,
}

/// Platform-specific addresses the executor needs. Which fields are
/// populated depends on the platform tag; AMM and unknown platforms leave
/// everything empty and the executor falls back to its aggregator route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformAccounts {
    pub bonding_curve: Option<String>,
    pub associated_bonding_curve: Option<String>,
    pub creator_vault: Option<String>,
    pub global_config: Option<String>,
    pub pool_state: Option<String>,
    pub base_vault: Option<String>,
    pub quote_vault: Option<String>,
    pub fee_recipient: Option<String>,
    pub token_program: Option<String>,
}

impl PlatformAccounts {
    pub fn is_empty(&self) -> bool {
        self.bonding_curve.is_none()
            && self.associated_bonding_curve.is_none()
            && self.creator_vault.is_none()
            && self.global_config.is_none()
            && self.pool_state.is_none()
            && self.base_vault.is_none()
            && self.quote_vault.is_none()
            && self.fee_recipient.is_none()
            && self.token_program.is_none()
    }
}

/// The emitted signal: a WhaleBuy enriched with everything the trade
/// executor needs to act on the detected platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyIntent {
    pub buy: WhaleBuy,
    pub accounts: PlatformAccounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EmissionOutcome {
    Bought { position_handle: String },
    Failed { reason: String },
}

impl EmissionOutcome {
    pub fn is_bought(&self) -> bool {
        matches!(self, Self::Bought { .. })
    }
}

/// One pre-enriched transaction as delivered to the webhook endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnrichedTx {
    pub signature: String,
    pub timestamp: Option<i64>,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub fee_payer: String,
    pub native_transfers: Vec<NativeTransfer>,
    pub token_transfers: Vec<TokenTransfer>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NativeTransfer {
    pub from_user_account: String,
    pub to_user_account: String,
    /// Lamports.
    pub amount: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TokenTransfer {
    pub from_user_account: String,
    pub to_user_account: String,
    pub mint: String,
    pub token_amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelId {
    GrpcPrimary,
    GrpcSecondary,
    Webhook,
}

impl ChannelId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GrpcPrimary => "grpc_primary",
            Self::GrpcSecondary => "grpc_secondary",
            Self::Webhook => "webhook",
        }
    }

    pub const ALL: [ChannelId; 3] = [Self::GrpcPrimary, Self::GrpcSecondary, Self::Webhook];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Connecting,
    Active,
    Degraded,
    Disabled,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelHealthRecord {
    pub channel: ChannelId,
    pub state: ChannelState,
    /// Seconds since the channel last delivered a message; `None` before
    /// the first message.
    pub last_message_age_seconds: Option<f64>,
    pub reconnect_count: u64,
    pub fast_close_count: u64,
    pub dropped_frames: u64,
}

/// One entry of the whale registry document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleInfo {
    pub label: String,
    #[serde(default = "default_win_rate")]
    pub win_rate: f64,
    #[serde(default)]
    pub source: String,
}

fn default_win_rate() -> f64 {
    0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_table_matches_canonical_program_ids() {
        assert_eq!(
            Platform::from_program_id(PUMP_FUN_PROGRAM),
            Some(Platform::PumpFun)
        );
        assert_eq!(
            Platform::from_program_id(RAYDIUM_AMM_PROGRAM),
            Some(Platform::RaydiumAmm)
        );
        assert_eq!(
            Platform::from_program_id("JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4"),
            Some(Platform::Jupiter)
        );
        assert_eq!(Platform::from_program_id("not-a-program"), None);
    }

    #[test]
    fn gross_sol_spent_uses_fee_payer_balance_delta() {
        let tx = ParsedTx {
            signature: "sig".to_string(),
            block_time: None,
            fee_payer: "whale".to_string(),
            account_keys: vec!["whale".to_string()],
            pre_balances: vec![2_000_000_000],
            post_balances: vec![1_500_000_000],
            token_post_balances: vec![],
            log_messages: vec![],
            succeeded: true,
            invoked_program_ids: BTreeSet::new(),
            swap: None,
            platform_hint: None,
        };
        assert!((tx.gross_sol_spent() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn enriched_tx_deserializes_provider_camel_case() {
        let body = serde_json::json!({
            "signature": "sig-1",
            "timestamp": 1_700_000_000,
            "type": "SWAP",
            "feePayer": "WalletA",
            "nativeTransfers": [
                {"fromUserAccount": "WalletA", "toUserAccount": "Pool", "amount": 500_000_000u64}
            ],
            "tokenTransfers": [
                {"fromUserAccount": "Pool", "toUserAccount": "WalletA", "mint": "MintX", "tokenAmount": 1000.0}
            ],
            "events": {"swap": {}}
        });
        let parsed: EnrichedTx = serde_json::from_value(body).expect("enriched tx");
        assert_eq!(parsed.tx_type, "SWAP");
        assert_eq!(parsed.fee_payer, "WalletA");
        assert_eq!(parsed.native_transfers[0].amount, 500_000_000);
        assert_eq!(parsed.token_transfers[0].mint, "MintX");
    }
}
