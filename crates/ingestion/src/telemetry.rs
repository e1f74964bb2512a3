use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Pipeline-wide ingestion counters. Written lock-free from the ingress
/// tasks, the supervisor and the fetch workers; reported periodically and
/// snapshotted into the health endpoint.
#[derive(Debug, Default)]
pub struct IngestionTelemetry {
    pub stream_messages_seen: AtomicU64,
    pub candidates_enqueued: AtomicU64,
    pub candidates_dropped_full_sink: AtomicU64,
    pub decode_ok: AtomicU64,
    pub decode_malformed: AtomicU64,
    pub decode_uninteresting: AtomicU64,
    pub decode_failed_tx: AtomicU64,
    pub decode_discriminator_used: AtomicU64,
    pub decode_balance_method_used: AtomicU64,
    pub dedup_dropped: AtomicU64,
    pub forwarded_to_classifier: AtomicU64,
    pub classifier_queue_dropped: AtomicU64,
    pub fallback_fetch_attempts: AtomicU64,
    pub fallback_fetch_recovered: AtomicU64,
    pub fallback_fetch_failed: AtomicU64,
    pub webhook_posts: AtomicU64,
    pub webhook_rejected_entries: AtomicU64,
    last_report_ms: AtomicI64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionSnapshot {
    pub stream_messages_seen: u64,
    pub candidates_enqueued: u64,
    pub candidates_dropped_full_sink: u64,
    pub decode_ok: u64,
    pub decode_malformed: u64,
    pub decode_uninteresting: u64,
    pub decode_failed_tx: u64,
    pub dedup_dropped: u64,
    pub forwarded_to_classifier: u64,
    pub classifier_queue_dropped: u64,
    pub fallback_fetch_attempts: u64,
    pub fallback_fetch_recovered: u64,
    pub fallback_fetch_failed: u64,
    pub webhook_posts: u64,
    pub webhook_rejected_entries: u64,
}

impl IngestionTelemetry {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestionSnapshot {
        IngestionSnapshot {
            stream_messages_seen: self.stream_messages_seen.load(Ordering::Relaxed),
            candidates_enqueued: self.candidates_enqueued.load(Ordering::Relaxed),
            candidates_dropped_full_sink: self.candidates_dropped_full_sink.load(Ordering::Relaxed),
            decode_ok: self.decode_ok.load(Ordering::Relaxed),
            decode_malformed: self.decode_malformed.load(Ordering::Relaxed),
            decode_uninteresting: self.decode_uninteresting.load(Ordering::Relaxed),
            decode_failed_tx: self.decode_failed_tx.load(Ordering::Relaxed),
            dedup_dropped: self.dedup_dropped.load(Ordering::Relaxed),
            forwarded_to_classifier: self.forwarded_to_classifier.load(Ordering::Relaxed),
            classifier_queue_dropped: self.classifier_queue_dropped.load(Ordering::Relaxed),
            fallback_fetch_attempts: self.fallback_fetch_attempts.load(Ordering::Relaxed),
            fallback_fetch_recovered: self.fallback_fetch_recovered.load(Ordering::Relaxed),
            fallback_fetch_failed: self.fallback_fetch_failed.load(Ordering::Relaxed),
            webhook_posts: self.webhook_posts.load(Ordering::Relaxed),
            webhook_rejected_entries: self.webhook_rejected_entries.load(Ordering::Relaxed),
        }
    }

    /// Emit a structured counter report at most once per `report_seconds`.
    /// The compare-exchange keeps concurrent callers from double-logging.
    pub fn maybe_report(&self, report_seconds: u64) {
        let report_seconds = report_seconds.max(5);
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0);
        let last = self.last_report_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) < report_seconds as i64 * 1_000 {
            return;
        }
        if self
            .last_report_ms
            .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        info!(
            stream_messages_seen = self.stream_messages_seen.load(Ordering::Relaxed),
            candidates_enqueued = self.candidates_enqueued.load(Ordering::Relaxed),
            candidates_dropped_full_sink =
                self.candidates_dropped_full_sink.load(Ordering::Relaxed),
            decode_ok = self.decode_ok.load(Ordering::Relaxed),
            decode_malformed = self.decode_malformed.load(Ordering::Relaxed),
            decode_uninteresting = self.decode_uninteresting.load(Ordering::Relaxed),
            decode_failed_tx = self.decode_failed_tx.load(Ordering::Relaxed),
            decode_discriminator_used = self.decode_discriminator_used.load(Ordering::Relaxed),
            decode_balance_method_used = self.decode_balance_method_used.load(Ordering::Relaxed),
            dedup_dropped = self.dedup_dropped.load(Ordering::Relaxed),
            forwarded_to_classifier = self.forwarded_to_classifier.load(Ordering::Relaxed),
            classifier_queue_dropped = self.classifier_queue_dropped.load(Ordering::Relaxed),
            fallback_fetch_attempts = self.fallback_fetch_attempts.load(Ordering::Relaxed),
            fallback_fetch_recovered = self.fallback_fetch_recovered.load(Ordering::Relaxed),
            fallback_fetch_failed = self.fallback_fetch_failed.load(Ordering::Relaxed),
            webhook_posts = self.webhook_posts.load(Ordering::Relaxed),
            webhook_rejected_entries = self.webhook_rejected_entries.load(Ordering::Relaxed),
            "ingestion pipeline counters"
        );
    }
}
