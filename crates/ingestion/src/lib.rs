mod decoder;
mod dedup;
mod health;
mod ingress;
mod supervisor;
mod telemetry;
mod watchdog;

pub use self::decoder::{decode_stream_tx, normalize_enriched, parse_rpc_json, DecodeError};
pub use self::dedup::SignalDedup;
pub use self::health::HealthBoard;
pub use self::ingress::grpc::GrpcIngress;
pub use self::ingress::webhook::{WebhookIngress, WebhookState};
pub use self::ingress::Ingress;
pub use self::supervisor::{
    spawn_fetch_workers, FetchRequest, ParsedCandidate, Supervisor, SupervisorHandles,
};
pub use self::telemetry::{IngestionSnapshot, IngestionTelemetry};
pub use self::watchdog::Watchdog;

use std::time::Instant;
use whalecopy_core_types::{ChannelId, EnrichedTx, ParsedTx};
use yellowstone_grpc_proto::prelude::SubscribeUpdateTransactionInfo;

/// What an ingress channel delivers: raw stream protobuf, a pre-enriched
/// webhook transaction, or an already-parsed transaction recovered by the
/// RPC fallback fetchers.
pub enum ChannelPayload {
    Stream {
        info: Box<SubscribeUpdateTransactionInfo>,
        /// Unix seconds from the stream envelope, when the provider sent
        /// one.
        block_time: Option<i64>,
    },
    Enriched(Box<EnrichedTx>),
    Parsed(Box<ParsedTx>),
}

pub struct Candidate {
    pub payload: ChannelPayload,
    pub arrived_at: Instant,
    pub channel: ChannelId,
}
