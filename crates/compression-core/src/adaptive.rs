//! Network-adaptive mode selection
//!
//! Maps a session's latest telemetry to a compression aggressiveness mode.
//! The policy is a fixed priority list over configurable thresholds; there
//! is deliberately no hidden state, so a mode can only change when the
//! telemetry changes.

use crate::types::{CompressionMode, NetworkTelemetry};

/// Thresholds driving mode selection
#[derive(Debug, Clone)]
pub struct ModeThresholds {
    /// Below this available bandwidth the pipeline compresses aggressively (kbps)
    pub low_bandwidth_kbps: u32,
    /// Below this available bandwidth the pipeline adapts per frame (kbps)
    pub medium_bandwidth_kbps: u32,
    /// Above this packet loss the pipeline backs off to conservative (percent)
    pub high_loss_pct: f32,
}

impl Default for ModeThresholds {
    fn default() -> Self {
        Self {
            low_bandwidth_kbps: 1000,
            medium_bandwidth_kbps: 3000,
            high_loss_pct: 5.0,
        }
    }
}

/// Maps network telemetry to a compression mode
#[derive(Debug, Clone, Default)]
pub struct ModeSelector {
    thresholds: ModeThresholds,
}

impl ModeSelector {
    /// Create a selector with the given thresholds
    pub fn new(thresholds: ModeThresholds) -> Self {
        Self { thresholds }
    }

    /// Select a mode for the given telemetry.
    ///
    /// Evaluated in priority order, first match wins. Total: every telemetry
    /// value maps to exactly one mode.
    pub fn select_mode(&self, telemetry: &NetworkTelemetry) -> CompressionMode {
        if telemetry.available_bandwidth_kbps < self.thresholds.low_bandwidth_kbps {
            CompressionMode::Aggressive
        } else if telemetry.available_bandwidth_kbps < self.thresholds.medium_bandwidth_kbps {
            CompressionMode::Adaptive
        } else if telemetry.packet_loss_pct > self.thresholds.high_loss_pct {
            CompressionMode::Conservative
        } else {
            CompressionMode::Adaptive
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn telemetry(bandwidth_kbps: u32, loss_pct: f32) -> NetworkTelemetry {
        NetworkTelemetry {
            available_bandwidth_kbps: bandwidth_kbps,
            packet_loss_pct: loss_pct,
            ..Default::default()
        }
    }

    #[test]
    fn test_low_bandwidth_is_aggressive() {
        let selector = ModeSelector::default();
        assert_eq!(selector.select_mode(&telemetry(500, 1.0)), CompressionMode::Aggressive);
    }

    #[test]
    fn test_high_bandwidth_low_loss_is_adaptive() {
        let selector = ModeSelector::default();
        assert_eq!(selector.select_mode(&telemetry(5000, 0.5)), CompressionMode::Adaptive);
    }

    #[test]
    fn test_medium_bandwidth_is_adaptive() {
        let selector = ModeSelector::default();
        assert_eq!(selector.select_mode(&telemetry(2000, 0.0)), CompressionMode::Adaptive);
    }

    #[test]
    fn test_high_loss_is_conservative() {
        let selector = ModeSelector::default();
        assert_eq!(selector.select_mode(&telemetry(8000, 7.5)), CompressionMode::Conservative);
    }

    #[test]
    fn test_bandwidth_outranks_loss() {
        // Lossy AND starved for bandwidth: the bandwidth rule fires first
        let selector = ModeSelector::default();
        assert_eq!(selector.select_mode(&telemetry(500, 20.0)), CompressionMode::Aggressive);
    }

    #[test]
    fn test_default_telemetry_maps_to_adaptive() {
        let selector = ModeSelector::default();
        assert_eq!(
            selector.select_mode(&NetworkTelemetry::default()),
            CompressionMode::Adaptive
        );
    }

    #[test]
    fn test_selection_is_stable_without_telemetry_change() {
        let selector = ModeSelector::default();
        let t = telemetry(2500, 3.0);
        let first = selector.select_mode(&t);
        for _ in 0..10 {
            assert_eq!(selector.select_mode(&t), first);
        }
    }
}
