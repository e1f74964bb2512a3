mod gate;

pub use self::gate::{EmissionGate, GateDrop};

use whalecopy_core_types::{BuyIntent, EmissionOutcome};

/// The external trade executor. The core hands it a BuyIntent and gets
/// back either a position handle (opaque; the core never introspects it)
/// or a failure reason. Retries live behind this boundary, not in the
/// pipeline.
pub trait TradeExecutor {
    fn emit(
        &self,
        intent: &BuyIntent,
    ) -> impl std::future::Future<Output = EmissionOutcome> + Send;
}
