//! Outbound quality sampling and the downgrade decision.
//!
//! While a call is active, the session reads outbound transport counters on a
//! fixed cadence. [`SampleWindow`] turns two consecutive readings into a
//! [`QualitySample`] (bitrate from the byte delta over wall-clock time, loss
//! from the cumulative counters). [`DowngradeTracker`] watches the verdicts
//! and decides, once per call, when sustained poor quality should force the
//! session down to audio-only.
//!
//! Both pieces are plain state machines fed explicit timestamps, so tests
//! drive them without timers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use televisit_media_core::TransportStats;
use tokio::time::Instant;

use crate::config::MonitorConfig;

/// One reading of outbound call quality.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualitySample {
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,
    /// Outbound bitrate since the previous sample, in kilobits per second.
    /// The first sample of a call reads 0 because there is no previous
    /// reading to take a delta against.
    pub bitrate_kbps: u32,
    /// Cumulative packet loss, `lost / sent * 100`, rounded to one decimal.
    /// 0 when nothing has been sent.
    pub packet_loss_percent: f64,
    /// Outbound video frame rate reported by the transport
    pub frames_per_second: f64,
    /// Cumulative bytes sent
    pub bytes_sent: u64,
    /// Cumulative packets sent
    pub packets_sent: u64,
    /// Cumulative packets lost
    pub packets_lost: u64,
}

impl QualitySample {
    /// Whether this sample reads as poor under the given thresholds.
    ///
    /// A link with no outbound activity at all is not poor, it is idle;
    /// without the activity gate every call would start "poor" before the
    /// first packet leaves.
    pub fn is_poor(&self, config: &MonitorConfig) -> bool {
        let has_activity = self.packets_sent > 0 || self.frames_per_second > 0.0;
        has_activity
            && (self.bitrate_kbps < config.min_bitrate_kbps
                || self.packet_loss_percent > config.max_loss_percent)
    }
}

/// Turns consecutive raw counter readings into quality samples.
#[derive(Debug, Default)]
pub struct SampleWindow {
    previous: Option<(Instant, TransportStats)>,
}

impl SampleWindow {
    /// Create an empty window
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a counter reading taken at `now` into a sample.
    pub fn observe(&mut self, now: Instant, stats: TransportStats) -> QualitySample {
        let bitrate_kbps = match self.previous {
            Some((previous_at, previous)) => {
                let dt = now.duration_since(previous_at).as_secs_f64();
                if dt > 0.0 {
                    let delta_bytes = stats.bytes_sent.saturating_sub(previous.bytes_sent);
                    ((delta_bytes * 8) as f64 / 1000.0 / dt).round() as u32
                } else {
                    0
                }
            }
            None => 0,
        };

        let packet_loss_percent = if stats.packets_sent > 0 {
            let raw = stats.packets_lost as f64 / stats.packets_sent as f64 * 100.0;
            (raw * 10.0).round() / 10.0
        } else {
            0.0
        };

        self.previous = Some((now, stats));

        QualitySample {
            timestamp: Utc::now(),
            bitrate_kbps,
            packet_loss_percent,
            frames_per_second: stats.frames_per_second,
            bytes_sent: stats.bytes_sent,
            packets_sent: stats.packets_sent,
            packets_lost: stats.packets_lost,
        }
    }
}

/// Decides when sustained poor quality forces a downgrade to audio-only.
///
/// The rules, applied to each sample in order:
///
/// - a good sample resets the poor streak, no matter what else is going on
/// - samples taken during the grace period after monitoring starts, or while
///   no remote media has arrived, never advance the streak (a counterpart who
///   has not joined yet must not count against the link)
/// - a poor sample while video is actually being sent advances the streak;
///   reaching the configured length fires the downgrade
/// - the tracker fires at most once per call
#[derive(Debug, Default)]
pub struct DowngradeTracker {
    window_start: Option<Instant>,
    consecutive_poor: u32,
    fired: bool,
}

impl DowngradeTracker {
    /// Create a tracker that has not started observing yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of consecutive poor samples counted so far
    pub fn consecutive_poor(&self) -> u32 {
        self.consecutive_poor
    }

    /// Whether the downgrade already fired
    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Fold one sample verdict in. Returns `true` exactly when the
    /// downgrade should happen now.
    pub fn observe(
        &mut self,
        now: Instant,
        poor: bool,
        remote_media_present: bool,
        video_sending: bool,
        config: &MonitorConfig,
    ) -> bool {
        let window_start = *self.window_start.get_or_insert(now);

        if !poor {
            self.consecutive_poor = 0;
            return false;
        }

        let eligible =
            now.duration_since(window_start) > config.grace_period && remote_media_present;
        if !eligible || self.fired || !video_sending {
            // poor but not actionable; the streak holds where it is
            return false;
        }

        self.consecutive_poor += 1;
        if self.consecutive_poor >= config.poor_streak_to_downgrade {
            self.fired = true;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn stats(bytes: u64, sent: u64, lost: u64, fps: f64) -> TransportStats {
        TransportStats::new(bytes, sent, lost, fps)
    }

    fn config() -> MonitorConfig {
        MonitorConfig::default()
    }

    #[tokio::test]
    async fn first_sample_reports_zero_bitrate() {
        let mut window = SampleWindow::new();
        let start = Instant::now();

        let first = window.observe(start, stats(500_000, 400, 0, 30.0));
        assert_eq!(first.bitrate_kbps, 0);

        let second =
            window.observe(start + Duration::from_secs(2), stats(550_000, 800, 0, 30.0));
        assert_eq!(second.bitrate_kbps, 200, "50 kB over 2 s is 200 kbps");
    }

    #[tokio::test]
    async fn loss_is_cumulative_and_rounded_to_one_decimal() {
        let mut window = SampleWindow::new();
        let sample = window.observe(Instant::now(), stats(10_000, 1000, 85, 30.0));
        assert_eq!(sample.packet_loss_percent, 8.5);

        let mut window = SampleWindow::new();
        let sample = window.observe(Instant::now(), stats(10_000, 3, 1, 30.0));
        assert_eq!(sample.packet_loss_percent, 33.3);
    }

    #[tokio::test]
    async fn idle_link_reports_zero_loss_and_is_never_poor() {
        let mut window = SampleWindow::new();
        let sample = window.observe(Instant::now(), stats(0, 0, 0, 0.0));
        assert_eq!(sample.packet_loss_percent, 0.0);
        assert!(!sample.is_poor(&config()), "no activity means idle, not poor");
    }

    #[tokio::test]
    async fn poor_verdicts_follow_the_thresholds() {
        let mut window = SampleWindow::new();
        let start = Instant::now();
        window.observe(start, stats(0, 0, 0, 30.0));

        // 20 kB over 2 s is 80 kbps, under the floor
        let starved =
            window.observe(start + Duration::from_secs(2), stats(20_000, 100, 0, 30.0));
        assert!(starved.is_poor(&config()));

        // healthy bitrate but 8.5% loss
        let lossy =
            window.observe(start + Duration::from_secs(4), stats(120_000, 1000, 85, 30.0));
        assert!(lossy.is_poor(&config()));

        // healthy on both axes
        let good =
            window.observe(start + Duration::from_secs(6), stats(220_000, 2000, 100, 30.0));
        assert_eq!(good.packet_loss_percent, 5.0);
        assert!(!good.is_poor(&config()));
    }

    #[tokio::test]
    async fn grace_period_samples_never_advance_the_streak() {
        let mut tracker = DowngradeTracker::new();
        let cfg = config();
        let start = Instant::now();

        for i in 0..10 {
            let at = start + Duration::from_secs(2 * i);
            assert!(!tracker.observe(at, true, true, true, &cfg));
        }
        assert_eq!(tracker.consecutive_poor(), 0, "all samples fell inside the grace period");
    }

    #[tokio::test]
    async fn five_poor_samples_after_the_grace_period_fire_once() {
        let mut tracker = DowngradeTracker::new();
        let cfg = config();
        let start = Instant::now();
        tracker.observe(start, false, true, true, &cfg);

        let after_grace = start + cfg.grace_period + Duration::from_secs(1);
        for i in 0..4 {
            let at = after_grace + Duration::from_secs(2 * i);
            assert!(!tracker.observe(at, true, true, true, &cfg));
        }
        let fifth = after_grace + Duration::from_secs(8);
        assert!(tracker.observe(fifth, true, true, true, &cfg));
        assert!(tracker.has_fired());

        // never a second time
        let later = fifth + Duration::from_secs(2);
        assert!(!tracker.observe(later, true, true, true, &cfg));
    }

    #[tokio::test]
    async fn a_good_sample_resets_the_streak() {
        let mut tracker = DowngradeTracker::new();
        let cfg = config();
        let start = Instant::now();
        tracker.observe(start, false, true, true, &cfg);

        let after_grace = start + cfg.grace_period + Duration::from_secs(1);
        for i in 0..4 {
            tracker.observe(after_grace + Duration::from_secs(2 * i), true, true, true, &cfg);
        }
        assert_eq!(tracker.consecutive_poor(), 4);

        tracker.observe(after_grace + Duration::from_secs(8), false, true, true, &cfg);
        assert_eq!(tracker.consecutive_poor(), 0);

        assert!(!tracker.observe(after_grace + Duration::from_secs(10), true, true, true, &cfg));
        assert_eq!(tracker.consecutive_poor(), 1, "the streak starts over");
    }

    #[tokio::test]
    async fn missing_remote_media_holds_the_streak_without_resetting_it() {
        let mut tracker = DowngradeTracker::new();
        let cfg = config();
        let start = Instant::now();
        tracker.observe(start, false, true, true, &cfg);

        let after_grace = start + cfg.grace_period + Duration::from_secs(1);
        for i in 0..3 {
            tracker.observe(after_grace + Duration::from_secs(2 * i), true, true, true, &cfg);
        }
        assert_eq!(tracker.consecutive_poor(), 3);

        // remote side drops away; poor samples stop counting but the
        // streak is not forgotten
        tracker.observe(after_grace + Duration::from_secs(6), true, false, true, &cfg);
        assert_eq!(tracker.consecutive_poor(), 3);

        tracker.observe(after_grace + Duration::from_secs(8), true, true, true, &cfg);
        assert!(tracker.observe(after_grace + Duration::from_secs(10), true, true, true, &cfg));
    }

    #[tokio::test]
    async fn poor_samples_without_outbound_video_do_not_advance_the_streak() {
        let mut tracker = DowngradeTracker::new();
        let cfg = config();
        let start = Instant::now();
        tracker.observe(start, false, true, true, &cfg);

        let after_grace = start + cfg.grace_period + Duration::from_secs(1);
        for i in 0..10 {
            let at = after_grace + Duration::from_secs(2 * i);
            assert!(!tracker.observe(at, true, true, false, &cfg));
        }
        assert_eq!(tracker.consecutive_poor(), 0);
    }
}
