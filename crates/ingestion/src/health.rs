use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Instant;
use whalecopy_core_types::{ChannelHealthRecord, ChannelId, ChannelState};

const NEVER: u64 = u64::MAX;

struct ChannelCell {
    channel: ChannelId,
    state: AtomicU8,
    /// Milliseconds since board creation of the last delivered message;
    /// `NEVER` before the first one.
    last_message_ms: AtomicU64,
    reconnect_count: AtomicU64,
    fast_close_count: AtomicU64,
    dropped_frames: AtomicU64,
}

impl ChannelCell {
    fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            state: AtomicU8::new(state_to_u8(ChannelState::Connecting)),
            last_message_ms: AtomicU64::new(NEVER),
            reconnect_count: AtomicU64::new(0),
            fast_close_count: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
        }
    }
}

fn state_to_u8(state: ChannelState) -> u8 {
    match state {
        ChannelState::Connecting => 0,
        ChannelState::Active => 1,
        ChannelState::Degraded => 2,
        ChannelState::Disabled => 3,
    }
}

fn state_from_u8(value: u8) -> ChannelState {
    match value {
        1 => ChannelState::Active,
        2 => ChannelState::Degraded,
        3 => ChannelState::Disabled,
        _ => ChannelState::Connecting,
    }
}

/// Lock-free per-channel health record, written by the ingress tasks and
/// the supervisor, read by the watchdog and the health endpoint.
pub struct HealthBoard {
    started: Instant,
    cells: [ChannelCell; 3],
}

impl Default for HealthBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthBoard {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            cells: [
                ChannelCell::new(ChannelId::GrpcPrimary),
                ChannelCell::new(ChannelId::GrpcSecondary),
                ChannelCell::new(ChannelId::Webhook),
            ],
        }
    }

    fn cell(&self, channel: ChannelId) -> &ChannelCell {
        match channel {
            ChannelId::GrpcPrimary => &self.cells[0],
            ChannelId::GrpcSecondary => &self.cells[1],
            ChannelId::Webhook => &self.cells[2],
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn touch(&self, channel: ChannelId) {
        let cell = self.cell(channel);
        cell.last_message_ms.store(self.elapsed_ms(), Ordering::Relaxed);
        cell.state
            .store(state_to_u8(ChannelState::Active), Ordering::Relaxed);
    }

    pub fn set_state(&self, channel: ChannelId, state: ChannelState) {
        self.cell(channel)
            .state
            .store(state_to_u8(state), Ordering::Relaxed);
    }

    pub fn note_reconnect(&self, channel: ChannelId) {
        self.cell(channel)
            .reconnect_count
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_fast_close(&self, channel: ChannelId) {
        self.cell(channel)
            .fast_close_count
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_dropped_frame(&self, channel: ChannelId) {
        self.cell(channel)
            .dropped_frames
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Seconds since the channel last delivered, `None` before the first
    /// message.
    pub fn last_message_age_seconds(&self, channel: ChannelId) -> Option<f64> {
        let stamp = self.cell(channel).last_message_ms.load(Ordering::Relaxed);
        if stamp == NEVER {
            return None;
        }
        Some((self.elapsed_ms().saturating_sub(stamp)) as f64 / 1_000.0)
    }

    /// Seconds since board creation; the watchdog uses this as the
    /// startup grace clock.
    pub fn uptime_seconds(&self) -> f64 {
        self.elapsed_ms() as f64 / 1_000.0
    }

    pub fn record(&self, channel: ChannelId) -> ChannelHealthRecord {
        let cell = self.cell(channel);
        ChannelHealthRecord {
            channel: cell.channel,
            state: state_from_u8(cell.state.load(Ordering::Relaxed)),
            last_message_age_seconds: self.last_message_age_seconds(channel),
            reconnect_count: cell.reconnect_count.load(Ordering::Relaxed),
            fast_close_count: cell.fast_close_count.load(Ordering::Relaxed),
            dropped_frames: cell.dropped_frames.load(Ordering::Relaxed),
        }
    }

    pub fn snapshot(&self) -> Vec<ChannelHealthRecord> {
        ChannelId::ALL
            .iter()
            .map(|channel| self.record(*channel))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untouched_channel_has_no_age_and_is_connecting() {
        let board = HealthBoard::new();
        let record = board.record(ChannelId::GrpcPrimary);
        assert!(record.last_message_age_seconds.is_none());
        assert_eq!(record.state, ChannelState::Connecting);
    }

    #[test]
    fn touch_activates_channel_and_starts_age_clock() {
        let board = HealthBoard::new();
        board.touch(ChannelId::Webhook);
        let record = board.record(ChannelId::Webhook);
        assert_eq!(record.state, ChannelState::Active);
        assert!(record.last_message_age_seconds.expect("age") < 1.0);
    }

    #[test]
    fn counters_accumulate_per_channel() {
        let board = HealthBoard::new();
        board.note_reconnect(ChannelId::GrpcPrimary);
        board.note_reconnect(ChannelId::GrpcPrimary);
        board.note_fast_close(ChannelId::GrpcPrimary);
        board.note_dropped_frame(ChannelId::GrpcSecondary);

        let primary = board.record(ChannelId::GrpcPrimary);
        assert_eq!(primary.reconnect_count, 2);
        assert_eq!(primary.fast_close_count, 1);
        assert_eq!(primary.dropped_frames, 0);
        let secondary = board.record(ChannelId::GrpcSecondary);
        assert_eq!(secondary.dropped_frames, 1);
    }
}
