//! Core types for the compression pipeline

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use slipstream_rtp_core::RtpTimestamp;

/// Classification of the frame carried by a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Self-contained reference frame, decodable on its own
    Full,
    /// Frame requiring a prior reference frame to decode
    Predicted,
}

/// Compression aggressiveness requested from the inference service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionMode {
    /// Maximize savings; accept quality loss (constrained networks)
    Aggressive,
    /// Balance savings against quality per frame
    Adaptive,
    /// Prioritize quality; compress lightly (lossy networks)
    Conservative,
}

/// Video codecs the frame classifier knows how to inspect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// H.264 / AVC
    H264,
    /// VP8
    Vp8,
    /// VP9
    Vp9,
}

impl VideoCodec {
    /// Canonical codec name as used in frame metadata
    pub fn name(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "H264",
            VideoCodec::Vp8 => "VP8",
            VideoCodec::Vp9 => "VP9",
        }
    }
}

/// Latest network measurements for a session
///
/// Mutated only through telemetry updates pushed by the measurement
/// component; the defaults let a brand-new session be classified before its
/// first update arrives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkTelemetry {
    /// Available bandwidth in kbps
    pub available_bandwidth_kbps: u32,
    /// Round-trip time in milliseconds
    pub round_trip_time_ms: f32,
    /// Packet loss in percent (0.0 - 100.0)
    pub packet_loss_pct: f32,
    /// Interarrival jitter in milliseconds
    pub jitter_ms: f32,
}

impl Default for NetworkTelemetry {
    fn default() -> Self {
        Self {
            available_bandwidth_kbps: 2000, // mid-range until the first report
            round_trip_time_ms: 50.0,
            packet_loss_pct: 0.0,
            jitter_ms: 0.0,
        }
    }
}

/// Frame-level metadata sent alongside the payload to the inference service
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMetadata {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Nominal frame rate
    pub fps: u32,
    /// Codec name (e.g. "H264", "VP8")
    pub codec: String,
    /// Whether this frame is a keyframe
    pub keyframe: bool,
    /// Presentation timestamp in RTP clock units
    pub presentation_timestamp: RtpTimestamp,
    /// Estimated stream bitrate in kbps
    pub estimated_bitrate_kbps: u32,
}

/// One compression request, constructed fresh per packet
#[derive(Debug, Clone)]
pub struct CompressionRequest {
    /// Session the frame belongs to
    pub session_id: String,
    /// Monotonically increasing frame number within the session
    pub frame_number: u64,
    /// Raw frame payload
    pub frame_data: Bytes,
    /// Full or predicted frame
    pub frame_type: FrameType,
    /// Frame-level metadata
    pub metadata: FrameMetadata,
    /// Requested compression mode
    pub mode: CompressionMode,
    /// Target compression ratio (compressed / original)
    pub target_ratio: f32,
    /// Telemetry snapshot the mode was selected from
    pub telemetry: NetworkTelemetry,
}

/// Outcome of one compression request, consumed immediately by the pipeline
#[derive(Debug, Clone)]
pub struct CompressionResult {
    /// Whether the service compressed the frame
    pub success: bool,
    /// Compressed frame payload
    pub compressed_data: Bytes,
    /// Original payload size in bytes
    pub original_size: usize,
    /// Compressed payload size in bytes
    pub compressed_size: usize,
    /// Achieved compression ratio (compressed / original)
    pub ratio: f32,
    /// Model-reported quality score (0.0 - 1.0)
    pub quality_score: f32,
    /// Identifier of the model that served the request
    pub model_id: String,
    /// Whether the service itself fell back internally
    pub fallback_used: bool,
    /// Reason for the service-side fallback, if any
    pub fallback_reason: Option<String>,
    /// Service-side processing latency
    pub processing_time: Duration,
}

impl CompressionResult {
    /// Whether a successful result is internally consistent.
    ///
    /// A result that claims success but carries an empty payload, sizes that
    /// disagree with the payload, or a non-finite ratio is treated as a
    /// failure by the pipeline.
    pub fn is_well_formed(&self) -> bool {
        self.success
            && !self.compressed_data.is_empty()
            && self.compressed_size == self.compressed_data.len()
            && self.original_size > 0
            && self.ratio.is_finite()
            && self.ratio > 0.0
            && self.quality_score.is_finite()
    }
}

/// Advisory hints from the inference service, queried without compressing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionHints {
    /// Suggested encoder bitrate in kbps
    pub suggested_bitrate_kbps: u32,
    /// Suggested quality target (0.0 - 1.0)
    pub suggested_quality: f32,
    /// Mode the service would pick for the current conditions
    pub suggested_mode: CompressionMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good_result() -> CompressionResult {
        CompressionResult {
            success: true,
            compressed_data: Bytes::from_static(b"abc"),
            original_size: 10,
            compressed_size: 3,
            ratio: 0.3,
            quality_score: 0.9,
            model_id: "m1".to_string(),
            fallback_used: false,
            fallback_reason: None,
            processing_time: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_well_formed_result() {
        assert!(good_result().is_well_formed());
    }

    #[test]
    fn test_unsuccessful_result_is_not_well_formed() {
        let mut result = good_result();
        result.success = false;
        assert!(!result.is_well_formed());
    }

    #[test]
    fn test_size_mismatch_is_malformed() {
        let mut result = good_result();
        result.compressed_size = 99;
        assert!(!result.is_well_formed());
    }

    #[test]
    fn test_empty_payload_is_malformed() {
        let mut result = good_result();
        result.compressed_data = Bytes::new();
        result.compressed_size = 0;
        assert!(!result.is_well_formed());
    }

    #[test]
    fn test_non_finite_ratio_is_malformed() {
        let mut result = good_result();
        result.ratio = f32::NAN;
        assert!(!result.is_well_formed());
    }

    #[test]
    fn test_default_telemetry_is_mid_range() {
        let telemetry = NetworkTelemetry::default();
        assert_eq!(telemetry.available_bandwidth_kbps, 2000);
        assert_eq!(telemetry.packet_loss_pct, 0.0);
    }
}
