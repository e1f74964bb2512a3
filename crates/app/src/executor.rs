use tracing::info;
use whalecopy_core_types::{BuyIntent, EmissionOutcome};
use whalecopy_emission::TradeExecutor;
use whalecopy_state::unix_now_seconds;

/// Paper-trading executor: acknowledges every BuyIntent with a synthetic
/// position handle. Stands in for the real trade executor in dry runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct PaperExecutor;

impl TradeExecutor for PaperExecutor {
    async fn emit(&self, intent: &BuyIntent) -> EmissionOutcome {
        let mint_prefix: String = intent.buy.token_mint.chars().take(8).collect();
        let position_handle = format!("paper-{mint_prefix}-{}", unix_now_seconds());
        info!(
            mint = %intent.buy.token_mint,
            whale = %intent.buy.whale_label,
            amount_sol = intent.buy.amount_sol,
            platform = intent.buy.platform.as_str(),
            position_handle = %position_handle,
            "paper buy executed"
        );
        EmissionOutcome::Bought { position_handle }
    }
}
