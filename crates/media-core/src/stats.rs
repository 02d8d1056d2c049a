//! Outbound transport counters.

use serde::{Deserialize, Serialize};

/// Cumulative outbound counters read from the transport, summed across the
/// audio and video send paths.
///
/// Counters only ever grow for the life of a transport; rate and ratio
/// figures are derived by the quality monitor from consecutive readings.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TransportStats {
    /// Total payload bytes sent since the transport was created.
    pub bytes_sent: u64,
    /// Total packets sent since the transport was created.
    pub packets_sent: u64,
    /// Total packets reported lost by the far side.
    pub packets_lost: u64,
    /// Current outbound video frame rate; 0.0 when no video path exists.
    pub frames_per_second: f64,
}

impl TransportStats {
    /// Build a reading from raw counters.
    pub fn new(bytes_sent: u64, packets_sent: u64, packets_lost: u64, frames_per_second: f64) -> Self {
        Self {
            bytes_sent,
            packets_sent,
            packets_lost,
            frames_per_second,
        }
    }

    /// Whether the counters show any evidence of outbound activity.
    pub fn has_activity(&self) -> bool {
        self.packets_sent > 0 || self.frames_per_second > 0.0
    }
}
