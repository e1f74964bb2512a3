use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};
use whalecopy_config::WatchdogConfig;
use whalecopy_core_types::ChannelId;

use crate::health::HealthBoard;

/// Which channels have gone quiet past the alert threshold.
#[derive(Debug, PartialEq, Eq)]
enum SilenceVerdict {
    Healthy,
    /// Some channels silent, at least one still active.
    Partial(Vec<ChannelId>),
    AllSilent,
}

/// Observes per-channel last-message ages and alarms; never restarts
/// anything. Each ingress owns its own reconnect loop.
pub struct Watchdog {
    board: Arc<HealthBoard>,
    config: WatchdogConfig,
    shutdown: watch::Receiver<bool>,
    last_all_alert: Option<Instant>,
    last_partial_alert: Option<Instant>,
}

impl Watchdog {
    pub fn new(
        board: Arc<HealthBoard>,
        config: WatchdogConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            board,
            config,
            shutdown,
            last_all_alert: None,
            last_partial_alert: None,
        }
    }

    pub async fn run(mut self) {
        let mut interval = time::interval(Duration::from_secs(
            self.config.check_interval_seconds.max(5),
        ));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            alert_after_seconds = self.config.silence_alert_seconds,
            "watchdog started"
        );

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => self.check(),
            }
        }
        info!("watchdog stopped");
    }

    fn check(&mut self) {
        let threshold = self.config.silence_alert_seconds.max(1) as f64;
        let uptime = self.board.uptime_seconds();
        // Startup grace: channels may simply not have seen a whale yet.
        if uptime < threshold {
            return;
        }

        let ages: Vec<(ChannelId, f64)> = ChannelId::ALL
            .iter()
            .map(|channel| {
                let age = self
                    .board
                    .last_message_age_seconds(*channel)
                    .unwrap_or(uptime);
                (*channel, age)
            })
            .collect();

        match classify_silence(&ages, threshold) {
            SilenceVerdict::Healthy => {}
            SilenceVerdict::AllSilent => {
                if self.should_alert_all() {
                    let detail: Vec<String> = ages
                        .iter()
                        .map(|(channel, age)| format!("{}={age:.0}s", channel.as_str()))
                        .collect();
                    error!(
                        threshold_seconds = self.config.silence_alert_seconds,
                        ages = %detail.join(" "),
                        "ALL ingress channels silent"
                    );
                }
            }
            SilenceVerdict::Partial(silent) => {
                if self.should_alert_partial() {
                    let names: Vec<&str> =
                        silent.iter().map(|channel| channel.as_str()).collect();
                    warn!(
                        silent_channels = %names.join(","),
                        threshold_seconds = self.config.silence_alert_seconds,
                        "ingress channel silent while others are active"
                    );
                }
            }
        }
    }

    fn should_alert_all(&mut self) -> bool {
        should_repeat(
            &mut self.last_all_alert,
            Duration::from_secs(self.config.alert_repeat_seconds.max(1)),
        )
    }

    fn should_alert_partial(&mut self) -> bool {
        should_repeat(
            &mut self.last_partial_alert,
            Duration::from_secs(self.config.alert_repeat_seconds.max(1)),
        )
    }
}

fn should_repeat(last: &mut Option<Instant>, every: Duration) -> bool {
    let now = Instant::now();
    match last {
        Some(previous) if now.duration_since(*previous) < every => false,
        _ => {
            *last = Some(now);
            true
        }
    }
}

fn classify_silence(ages: &[(ChannelId, f64)], threshold: f64) -> SilenceVerdict {
    let silent: Vec<ChannelId> = ages
        .iter()
        .filter(|(_, age)| *age > threshold)
        .map(|(channel, _)| *channel)
        .collect();
    if silent.is_empty() {
        SilenceVerdict::Healthy
    } else if silent.len() == ages.len() {
        SilenceVerdict::AllSilent
    } else {
        SilenceVerdict::Partial(silent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_channels_stale_is_all_silent() {
        let ages = vec![
            (ChannelId::GrpcPrimary, 400.0),
            (ChannelId::GrpcSecondary, 500.0),
            (ChannelId::Webhook, 600.0),
        ];
        assert_eq!(classify_silence(&ages, 300.0), SilenceVerdict::AllSilent);
    }

    #[test]
    fn one_stale_channel_is_partial() {
        let ages = vec![
            (ChannelId::GrpcPrimary, 400.0),
            (ChannelId::GrpcSecondary, 10.0),
            (ChannelId::Webhook, 20.0),
        ];
        assert_eq!(
            classify_silence(&ages, 300.0),
            SilenceVerdict::Partial(vec![ChannelId::GrpcPrimary])
        );
    }

    #[test]
    fn age_exactly_at_threshold_is_healthy() {
        let ages = vec![
            (ChannelId::GrpcPrimary, 300.0),
            (ChannelId::GrpcSecondary, 300.0),
            (ChannelId::Webhook, 300.0),
        ];
        assert_eq!(classify_silence(&ages, 300.0), SilenceVerdict::Healthy);
    }

    #[test]
    fn alert_repeat_gate_suppresses_within_window() {
        let mut last = None;
        assert!(should_repeat(&mut last, Duration::from_secs(60)));
        assert!(!should_repeat(&mut last, Duration::from_secs(60)));
        // A zero window always fires.
        let mut immediate = None;
        assert!(should_repeat(&mut immediate, Duration::ZERO));
        assert!(should_repeat(&mut immediate, Duration::ZERO));
    }
}
