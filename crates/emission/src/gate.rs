use std::sync::Arc;
use tracing::{error, info, warn};
use whalecopy_core_types::{BuyIntent, EmissionOutcome};
use whalecopy_state::{ReserveVerdict, SharedState};

use crate::TradeExecutor;

/// Why a BuyIntent was not handed to the executor at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDrop {
    AlreadyEmitted,
    BuyInProgress,
}

impl GateDrop {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyEmitted => "already_emitted",
            Self::BuyInProgress => "buy_in_progress",
        }
    }
}

/// The single typed handoff to the trade executor. The reservation
/// (emitted-set check plus buying-in-progress insert) is one atomic step
/// under the shared state's mutex; the executor call happens outside the
/// lock. Only a `Bought` outcome records the mint — a `Failed` leaves it
/// eligible for future signals.
pub struct EmissionGate {
    state: Arc<SharedState>,
}

impl EmissionGate {
    pub fn new(state: Arc<SharedState>) -> Self {
        Self { state }
    }

    pub async fn emit<E: TradeExecutor>(
        &self,
        intent: BuyIntent,
        executor: &E,
    ) -> Result<EmissionOutcome, GateDrop> {
        let mint = intent.buy.token_mint.clone();
        match self.state.try_reserve_emission(&mint).await {
            ReserveVerdict::AlreadyEmitted => {
                info!(
                    mint = %mint,
                    signature = %intent.buy.signature,
                    "skip already-emitted token"
                );
                return Err(GateDrop::AlreadyEmitted);
            }
            ReserveVerdict::BuyInProgress => {
                info!(mint = %mint, "skip token with buy in progress");
                return Err(GateDrop::BuyInProgress);
            }
            ReserveVerdict::Reserved => {}
        }

        let outcome = executor.emit(&intent).await;
        match &outcome {
            EmissionOutcome::Bought { position_handle } => {
                info!(
                    mint = %mint,
                    whale = %intent.buy.whale_label,
                    amount_sol = intent.buy.amount_sol,
                    platform = intent.buy.platform.as_str(),
                    position_handle = %position_handle,
                    "buy intent executed"
                );
                if let Err(persist_error) = self.state.finish_emission(&intent).await {
                    // The buy happened; losing the record risks at most
                    // one duplicate attempt which the executor refuses.
                    error!(
                        mint = %mint,
                        error = %persist_error,
                        "CRITICAL: failed persisting emission record"
                    );
                }
            }
            EmissionOutcome::Failed { reason } => {
                warn!(mint = %mint, reason = %reason, "buy intent failed, token stays eligible");
                self.state.abort_reservation(&mint).await;
            }
        }
        Ok(outcome)
    }
}
