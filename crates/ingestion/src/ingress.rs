pub mod grpc;
pub mod webhook;

use crate::Candidate;
use tokio::sync::mpsc;
use whalecopy_core_types::ChannelHealthRecord;

/// One concurrent source of candidate transactions. `start` spawns the
/// channel's long-lived task; `stop` signals cooperative shutdown (the
/// task must unwind within the pipeline's 15 second budget); `health`
/// reads the channel's current record.
pub trait Ingress {
    fn start(&mut self, sink: mpsc::Sender<Candidate>) -> anyhow::Result<()>;
    fn stop(&self);
    fn health(&self) -> ChannelHealthRecord;
}
