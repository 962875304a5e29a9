//! Frame classification
//!
//! Labels the frame carried by each packet as a full (reference) frame or a
//! predicted frame so the pipeline can shape its compression request. The
//! classifier is pure and total: it always returns a value, defaulting to
//! `Predicted` when nothing recognizable is found.

use std::collections::HashMap;

use tracing::debug;

use slipstream_rtp_core::{MediaPacket, RtpPayloadType};

use crate::types::{FrameType, VideoCodec};

/// Classifies frames from the RTP marker bit and codec-specific payload markers
#[derive(Debug, Clone)]
pub struct FrameClassifier {
    /// Payload-type to codec mapping used for first-byte inspection
    payload_codecs: HashMap<RtpPayloadType, VideoCodec>,
}

impl FrameClassifier {
    /// Create a classifier with the default dynamic payload mappings
    pub fn new() -> Self {
        let mut payload_codecs = HashMap::new();
        payload_codecs.insert(96, VideoCodec::Vp8);
        payload_codecs.insert(98, VideoCodec::Vp9);
        payload_codecs.insert(102, VideoCodec::H264);

        debug!("Initialized FrameClassifier with {} payload mappings", payload_codecs.len());
        Self { payload_codecs }
    }

    /// Register a dynamic payload type for codec-specific inspection
    pub fn register_payload_type(&mut self, payload_type: RtpPayloadType, codec: VideoCodec) {
        debug!("Registered payload mapping: PT:{} -> {}", payload_type, codec.name());
        self.payload_codecs.insert(payload_type, codec);
    }

    /// Codec mapped to a payload type, if known
    pub fn codec_for(&self, payload_type: RtpPayloadType) -> Option<VideoCodec> {
        self.payload_codecs.get(&payload_type).copied()
    }

    /// Classify the frame carried by a packet.
    ///
    /// Decision order: marker bit, then codec-specific keyframe markers in
    /// the first payload byte, then a conservative `Predicted` default.
    /// Deterministic: the same packet bytes always yield the same answer.
    pub fn classify(&self, packet: &MediaPacket) -> FrameType {
        if packet.marker {
            return FrameType::Full;
        }

        let Some(&first) = packet.payload.first() else {
            return FrameType::Predicted;
        };

        match self.payload_codecs.get(&packet.payload_type) {
            Some(VideoCodec::H264) => {
                // NAL unit type: 5 = IDR slice, 7 = SPS, 8 = PPS
                match first & 0x1f {
                    5 | 7 | 8 => FrameType::Full,
                    _ => FrameType::Predicted,
                }
            }
            Some(VideoCodec::Vp8) => {
                // Inverse keyframe bit: clear means key frame
                if first & 0x01 == 0 {
                    FrameType::Full
                } else {
                    FrameType::Predicted
                }
            }
            // VP9 keyframes need full descriptor parsing; classify conservatively
            Some(VideoCodec::Vp9) | None => FrameType::Predicted,
        }
    }
}

impl Default for FrameClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn packet(payload_type: u8, payload: &'static [u8]) -> MediaPacket {
        MediaPacket::new("s1", 1, payload_type, 0, 0, Bytes::from_static(payload))
    }

    #[test]
    fn test_marker_bit_wins() {
        let classifier = FrameClassifier::new();
        // Marker set classifies as Full even when the payload says delta frame
        let p = packet(96, &[0x01]).with_marker(true);
        assert_eq!(classifier.classify(&p), FrameType::Full);
    }

    #[test]
    fn test_h264_keyframe_nal_types() {
        let classifier = FrameClassifier::new();
        assert_eq!(classifier.classify(&packet(102, &[0x65])), FrameType::Full); // IDR
        assert_eq!(classifier.classify(&packet(102, &[0x67])), FrameType::Full); // SPS
        assert_eq!(classifier.classify(&packet(102, &[0x68])), FrameType::Full); // PPS
        assert_eq!(classifier.classify(&packet(102, &[0x61])), FrameType::Predicted); // non-IDR slice
    }

    #[test]
    fn test_vp8_keyframe_bit() {
        let classifier = FrameClassifier::new();
        assert_eq!(classifier.classify(&packet(96, &[0x10])), FrameType::Full);
        assert_eq!(classifier.classify(&packet(96, &[0x11])), FrameType::Predicted);
    }

    #[test]
    fn test_unknown_codec_defaults_to_predicted() {
        let classifier = FrameClassifier::new();
        assert_eq!(classifier.classify(&packet(42, &[0x65])), FrameType::Predicted);
    }

    #[test]
    fn test_empty_payload_defaults_to_predicted() {
        let classifier = FrameClassifier::new();
        assert_eq!(classifier.classify(&packet(102, &[])), FrameType::Predicted);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = FrameClassifier::new();
        let p = packet(102, &[0x65, 0x88, 0x84]);
        let first = classifier.classify(&p);
        for _ in 0..10 {
            assert_eq!(classifier.classify(&p), first);
        }
    }

    #[test]
    fn test_register_dynamic_payload_type() {
        let mut classifier = FrameClassifier::new();
        assert_eq!(classifier.codec_for(107), None);

        classifier.register_payload_type(107, VideoCodec::H264);
        assert_eq!(classifier.codec_for(107), Some(VideoCodec::H264));
        assert_eq!(classifier.classify(&packet(107, &[0x65])), FrameType::Full);
    }
}
