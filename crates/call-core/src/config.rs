//! Configuration for call sessions and the quality monitor.

use std::time::Duration;

use televisit_media_core::DEFAULT_TRAVERSAL_SERVER;
use url::Url;

use crate::error::{CallError, CallResult};

// Quality monitor tuning. The sampling cadence, thresholds, and streak
// length below come from field observation of telehealth calls on
// residential links; changing one usually means revisiting the others.
const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(2000);
const DEFAULT_MIN_BITRATE_KBPS: u32 = 150;
const DEFAULT_MAX_LOSS_PERCENT: f64 = 8.0;
const DEFAULT_POOR_STREAK_TO_DOWNGRADE: u32 = 5;
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(20_000);

const DEFAULT_SIGNALING_INTERVAL: Duration = Duration::from_millis(1000);
const DEFAULT_WATCHER_INTERVAL: Duration = Duration::from_millis(1000);
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Thresholds and cadence for the in-call quality monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// How often outbound stats are sampled while the call is active
    pub sample_interval: Duration,
    /// Bitrate below this is considered poor, in kilobits per second
    pub min_bitrate_kbps: u32,
    /// Packet loss above this is considered poor, in percent
    pub max_loss_percent: f64,
    /// Consecutive poor samples required before downgrading to audio-only
    pub poor_streak_to_downgrade: u32,
    /// Time after monitoring starts during which samples never count
    /// toward the downgrade streak
    pub grace_period: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            min_bitrate_kbps: DEFAULT_MIN_BITRATE_KBPS,
            max_loss_percent: DEFAULT_MAX_LOSS_PERCENT,
            poor_streak_to_downgrade: DEFAULT_POOR_STREAK_TO_DOWNGRADE,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// What a session does about the ringing phase on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RingingPolicy {
    /// Ring until `accept` or `decline` is called. The normal mode: a
    /// person answers the call.
    #[default]
    Manual,
    /// Accept automatically after ringing for the given duration, unless
    /// answered or declined first. Meant for demos and unattended test
    /// rigs, not production.
    AutoAdvance {
        /// How long to ring before self-accepting
        after: Duration,
    },
}

/// Configuration for the call manager and the sessions it creates.
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// Traversal (STUN/TURN) server URLs handed to each peer transport
    pub traversal_servers: Vec<String>,
    /// How often queued signaling messages are drained
    pub signaling_interval: Duration,
    /// How often the registry is polled for incoming calls
    pub watcher_interval: Duration,
    /// What outgoing calls do about their own ringing phase
    pub ringing_policy: RingingPolicy,
    /// Quality monitor tuning
    pub monitor: MonitorConfig,
    /// Buffer size of the broadcast event channel
    pub event_capacity: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            traversal_servers: vec![DEFAULT_TRAVERSAL_SERVER.to_string()],
            signaling_interval: DEFAULT_SIGNALING_INTERVAL,
            watcher_interval: DEFAULT_WATCHER_INTERVAL,
            ringing_policy: RingingPolicy::default(),
            monitor: MonitorConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl CallConfig {
    /// Replace the traversal server list
    pub fn with_traversal_servers(mut self, servers: Vec<String>) -> Self {
        self.traversal_servers = servers;
        self
    }

    /// Set the ringing policy for outgoing calls
    pub fn with_ringing_policy(mut self, policy: RingingPolicy) -> Self {
        self.ringing_policy = policy;
        self
    }

    /// Set how often queued signaling messages are drained
    pub fn with_signaling_interval(mut self, interval: Duration) -> Self {
        self.signaling_interval = interval;
        self
    }

    /// Replace the quality monitor tuning
    pub fn with_monitor(mut self, monitor: MonitorConfig) -> Self {
        self.monitor = monitor;
        self
    }

    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> CallResult<()> {
        if self.traversal_servers.is_empty() {
            return Err(CallError::configuration("at least one traversal server is required"));
        }
        for server in &self.traversal_servers {
            Url::parse(server).map_err(|e| {
                CallError::configuration(format!("invalid traversal server '{server}': {e}"))
            })?;
        }
        if self.signaling_interval.is_zero() {
            return Err(CallError::configuration("signaling interval must be nonzero"));
        }
        if self.watcher_interval.is_zero() {
            return Err(CallError::configuration("watcher interval must be nonzero"));
        }
        if self.monitor.sample_interval.is_zero() {
            return Err(CallError::configuration("monitor sample interval must be nonzero"));
        }
        if self.monitor.poor_streak_to_downgrade == 0 {
            return Err(CallError::configuration("poor streak threshold must be nonzero"));
        }
        if self.event_capacity == 0 {
            return Err(CallError::configuration("event capacity must be nonzero"));
        }
        Ok(())
    }
}
