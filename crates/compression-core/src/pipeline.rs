//! Compression pipeline orchestration
//!
//! Composes the frame classifier, mode selector, session registry,
//! extension codec and inference client into the per-packet state machine:
//! gate, classify, contextualize, decide, request, invoke, then apply or
//! fall back. Every packet reaches a terminal outcome within one call; on
//! any failure the original packet passes through byte-for-byte unchanged.
//! Packets are never dropped and never returned partially modified.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use slipstream_rtp_core::MediaPacket;

use crate::adaptive::{ModeSelector, ModeThresholds};
use crate::classifier::FrameClassifier;
use crate::error::{CompressionError, Result};
use crate::events::CompressionEvent;
use crate::extension::{self, ExtensionMetadata, COMPRESSION_EXTENSION_ID};
use crate::inference::{InferenceClient, InferenceClientConfig, InferenceService};
use crate::session::{SessionRegistry, SessionSnapshot, DEFAULT_IDLE_TIMEOUT, SWEEP_INTERVAL};
use crate::stats::{PipelineStats, PipelineStatsSnapshot};
use crate::types::{
    CompressionHints, CompressionMode, CompressionRequest, FrameMetadata, FrameType,
    NetworkTelemetry,
};

/// Configuration for the compression pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Master enable; when false every packet passes through untouched
    pub enabled: bool,
    /// Target compression ratio requested from the inference service
    pub target_ratio: f32,
    /// One-byte header extension id carrying compression metadata
    pub extension_id: u8,
    /// Idle time after which a session is swept
    pub idle_timeout: Duration,
    /// Cadence of the eviction sweep
    pub sweep_interval: Duration,
    /// Frame width advertised to the inference service
    pub frame_width: u32,
    /// Frame height advertised to the inference service
    pub frame_height: u32,
    /// Frame rate advertised to the inference service
    pub frame_fps: u32,
    /// Inference client settings
    pub inference: InferenceClientConfig,
    /// Mode selection thresholds
    pub thresholds: ModeThresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_ratio: 0.5,
            extension_id: COMPRESSION_EXTENSION_ID,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sweep_interval: SWEEP_INTERVAL,
            frame_width: 1280,
            frame_height: 720,
            frame_fps: 30,
            inference: InferenceClientConfig::default(),
            thresholds: ModeThresholds::default(),
        }
    }
}

/// Terminal outcome of processing one packet
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PacketDisposition {
    /// Payload replaced with compressed bytes, metadata extension attached
    Compressed {
        /// Achieved compression ratio
        ratio: f32,
    },
    /// Packet forwarded unmodified
    PassedThrough {
        /// Why the packet was not compressed
        reason: PassthroughReason,
    },
}

/// Why a packet was passed through unmodified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughReason {
    /// Compression feature disabled
    Disabled,
    /// Inference service unavailable
    Unavailable,
    /// Inference call exceeded its latency bound
    Timeout,
    /// Inference call failed
    InferenceFailed,
    /// Inference returned internally inconsistent data
    MalformedResult,
}

/// Per-packet compression orchestrator
///
/// Safe to share behind an `Arc` and call concurrently from multiple
/// packet-delivery contexts: the only shared mutable state is the sharded
/// session registry and the atomic counters, and no lock is held across
/// the inference call.
pub struct CompressionPipeline {
    /// Pipeline settings
    config: PipelineConfig,
    /// Frame classifier
    classifier: FrameClassifier,
    /// Network-adaptive mode selector
    selector: ModeSelector,
    /// Per-session state
    registry: Arc<SessionRegistry>,
    /// Rolling counters
    stats: Arc<PipelineStats>,
    /// Inference client adapter
    client: Arc<InferenceClient>,
    /// Event receiver, handed out once
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<CompressionEvent>>>,
    /// Background eviction sweep
    sweep_task: Mutex<Option<JoinHandle<()>>>,
}

impl CompressionPipeline {
    /// Create a pipeline around an external inference service
    pub fn new(config: PipelineConfig, service: Arc<dyn InferenceService>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let client = Arc::new(InferenceClient::new(service, config.inference.clone()));
        let selector = ModeSelector::new(config.thresholds.clone());

        Self {
            classifier: FrameClassifier::new(),
            selector,
            registry: Arc::new(SessionRegistry::new(event_tx)),
            stats: Arc::new(PipelineStats::new()),
            client,
            event_rx: Mutex::new(Some(event_rx)),
            sweep_task: Mutex::new(None),
            config,
        }
    }

    /// Take the pipeline event receiver (first caller wins)
    pub fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<CompressionEvent>> {
        self.event_rx.lock().take()
    }

    /// Initialize the inference client and start the eviction sweep.
    ///
    /// A failed client initialization is surfaced so the owning process can
    /// decide whether to run in permanently-disabled mode.
    pub async fn start(&self) -> Result<()> {
        self.client.initialize().await?;

        let registry = self.registry.clone();
        let idle_timeout = self.config.idle_timeout;
        let sweep_interval = self.config.sweep_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(sweep_interval);
            // The first tick fires immediately; skip it so a fresh pipeline
            // does not sweep an empty registry
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = registry.sweep_idle(Instant::now(), idle_timeout);
                if !removed.is_empty() {
                    debug!("Idle sweep removed {} session(s)", removed.len());
                }
            }
        });
        *self.sweep_task.lock() = Some(handle);

        info!(
            "Compression pipeline started (extension id {}, target ratio {})",
            self.config.extension_id, self.config.target_ratio
        );
        Ok(())
    }

    /// Stop the eviction sweep and shut the inference client down
    pub async fn stop(&self) {
        if let Some(handle) = self.sweep_task.lock().take() {
            handle.abort();
        }
        if let Err(e) = self.client.shutdown().await {
            warn!("Inference client shutdown failed: {}", e);
        }
        info!("Compression pipeline stopped");
    }

    /// Process one packet through the compression state machine.
    ///
    /// The packet is mutated only on success (payload replaced, metadata
    /// extension attached); every failure leaves it untouched.
    pub async fn process_rtp_packet(&self, packet: &mut MediaPacket) -> PacketDisposition {
        self.stats.record_processed();

        // Gate: disabled is a fast exit with no per-session bookkeeping
        if !self.config.enabled {
            self.stats.record_disabled_pass();
            return PacketDisposition::PassedThrough { reason: PassthroughReason::Disabled };
        }
        if !self.client.is_available().await {
            self.stats.record_fallback();
            return PacketDisposition::PassedThrough { reason: PassthroughReason::Unavailable };
        }

        // Classify and contextualize
        let frame_type = self.classifier.classify(packet);
        let (telemetry, frame_number) = self.registry.get_or_create(&packet.session_id);
        let mode = self.selector.select_mode(&telemetry);

        let request = self.build_request(packet, frame_type, frame_number, telemetry, mode);

        // Single attempt; the client owns the latency bound and no retry is
        // allowed on this path
        match self.client.compress_frame(&request).await {
            Ok(result) => {
                let original_size = packet.payload.len();
                packet.payload = result.compressed_data.clone();
                let metadata = ExtensionMetadata::from_result(&result);
                packet.set_extension(
                    self.config.extension_id,
                    Bytes::copy_from_slice(&extension::encode(&metadata)),
                );

                self.stats.record_compressed(original_size, result.compressed_size);
                self.registry.record_compression(&packet.session_id, result.ratio);
                debug!(
                    "Compressed frame {} for {}: {} -> {} bytes (ratio {:.3})",
                    frame_number, packet.session_id, original_size, result.compressed_size, result.ratio
                );
                PacketDisposition::Compressed { ratio: result.ratio }
            }
            Err(e) => {
                self.stats.record_fallback();
                self.registry.record_fallback(&packet.session_id);
                let reason = match &e {
                    CompressionError::Unavailable => PassthroughReason::Unavailable,
                    // Debug level: sustained unavailability would flood anything louder
                    CompressionError::Timeout { .. } => {
                        debug!("Compression timed out for {}, passing through", packet.session_id);
                        PassthroughReason::Timeout
                    }
                    CompressionError::MalformedResult { details } => {
                        debug!("Discarding malformed result for {}: {}", packet.session_id, details);
                        PassthroughReason::MalformedResult
                    }
                    CompressionError::InferenceFailed { reason } => {
                        debug!("Compression failed for {}: {}", packet.session_id, reason);
                        PassthroughReason::InferenceFailed
                    }
                    CompressionError::Initialization { .. } => PassthroughReason::Unavailable,
                };
                PacketDisposition::PassedThrough { reason }
            }
        }
    }

    /// Query advisory bitrate/quality hints without compressing.
    ///
    /// `None` when the session is unknown or the inference service is
    /// unavailable.
    pub async fn get_compression_hints(
        &self,
        session_id: &str,
        metadata: FrameMetadata,
    ) -> Option<CompressionHints> {
        let snapshot = self.registry.snapshot(session_id)?;
        if !self.client.is_available().await {
            return None;
        }

        let frame_type = if metadata.keyframe { FrameType::Full } else { FrameType::Predicted };
        let request = CompressionRequest {
            session_id: session_id.to_string(),
            frame_number: snapshot.frame_count,
            frame_data: Bytes::new(),
            frame_type,
            metadata,
            mode: self.selector.select_mode(&snapshot.telemetry),
            target_ratio: self.config.target_ratio,
            telemetry: snapshot.telemetry,
        };
        self.client.compression_hints(&request).await
    }

    /// Control-plane push of fresh telemetry for a session
    pub fn update_network_conditions(&self, session_id: &str, telemetry: NetworkTelemetry) {
        self.registry.update_telemetry(session_id, telemetry);
    }

    /// Control-plane notification that a session ended.
    /// Returns whether the session had state.
    pub fn end_session(&self, session_id: &str) -> bool {
        self.registry.remove(session_id)
    }

    /// Rolling pipeline counters
    pub fn stats(&self) -> PipelineStatsSnapshot {
        self.stats.snapshot()
    }

    /// Pipeline and inference client statistics as a key/value map,
    /// polled by the observability surface
    pub async fn get_statistics(&self) -> HashMap<String, String> {
        let mut map = self.stats.snapshot().to_map();
        map.extend(self.client.statistics().await);
        map
    }

    /// Per-session counters
    pub fn session_snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.registry.snapshot(session_id)
    }

    /// Identifiers of all active sessions
    pub fn active_sessions(&self) -> Vec<String> {
        self.registry.active_sessions()
    }

    fn build_request(
        &self,
        packet: &MediaPacket,
        frame_type: FrameType,
        frame_number: u64,
        telemetry: NetworkTelemetry,
        mode: CompressionMode,
    ) -> CompressionRequest {
        let codec = self
            .classifier
            .codec_for(packet.payload_type)
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        CompressionRequest {
            session_id: packet.session_id.clone(),
            frame_number,
            frame_data: packet.payload.clone(),
            frame_type,
            metadata: FrameMetadata {
                width: self.config.frame_width,
                height: self.config.frame_height,
                fps: self.config.frame_fps,
                codec,
                keyframe: frame_type == FrameType::Full,
                presentation_timestamp: packet.timestamp,
                estimated_bitrate_kbps: telemetry.available_bandwidth_kbps,
            },
            mode,
            target_ratio: self.config.target_ratio,
            telemetry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtensionError;
    use crate::types::{CompressionMode, CompressionResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    /// Inference stub compressing to 60% of the input at quality 0.9
    struct StubService {
        available: AtomicBool,
        fail: AtomicBool,
        calls: AtomicU64,
    }

    impl StubService {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                available: AtomicBool::new(true),
                fail: AtomicBool::new(false),
                calls: AtomicU64::new(0),
            })
        }
    }

    #[async_trait]
    impl InferenceService for StubService {
        async fn initialize(&self) -> Result<()> {
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }

        async fn is_available(&self) -> bool {
            self.available.load(Ordering::Relaxed)
        }

        async fn compress_frame(&self, request: &CompressionRequest) -> Option<CompressionResult> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail.load(Ordering::Relaxed) {
                return None;
            }
            let compressed = Bytes::from(vec![0xc0; request.frame_data.len() * 6 / 10]);
            Some(CompressionResult {
                success: true,
                original_size: request.frame_data.len(),
                compressed_size: compressed.len(),
                compressed_data: compressed,
                ratio: 0.6,
                quality_score: 0.9,
                model_id: "m1".to_string(),
                fallback_used: false,
                fallback_reason: None,
                processing_time: Duration::from_millis(3),
            })
        }

        async fn compression_hints(&self, request: &CompressionRequest) -> Option<CompressionHints> {
            Some(CompressionHints {
                suggested_bitrate_kbps: request.telemetry.available_bandwidth_kbps / 2,
                suggested_quality: 0.85,
                suggested_mode: CompressionMode::Adaptive,
            })
        }

        async fn statistics(&self) -> HashMap<String, String> {
            HashMap::from([(
                "service_calls".to_string(),
                self.calls.load(Ordering::Relaxed).to_string(),
            )])
        }
    }

    fn test_packet(session_id: &str) -> MediaPacket {
        MediaPacket::new(session_id, 0xabcd, 96, 100, 3000, Bytes::from(vec![0x11; 100]))
    }

    #[tokio::test]
    async fn test_successful_compression_rewrites_packet() {
        let pipeline = CompressionPipeline::new(PipelineConfig::default(), StubService::new());
        let mut packet = test_packet("s1");

        let disposition = pipeline.process_rtp_packet(&mut packet).await;
        assert_eq!(disposition, PacketDisposition::Compressed { ratio: 0.6 });
        assert_eq!(packet.payload.len(), 60);
        assert!(packet.has_extensions);

        let metadata = extension::decode(packet.extension(15).unwrap()).unwrap();
        assert!((metadata.ratio - 0.600).abs() < 0.001);
        assert!((metadata.quality_score - 0.900).abs() < 0.001);
        assert_eq!(metadata.model_hash, extension::hash_model_id("m1"));
        assert!(!metadata.fallback);

        let stats = pipeline.stats();
        assert_eq!(stats.frames_compressed, 1);
        assert_eq!(stats.bytes_saved, 40);
        assert!(stats.is_consistent());
    }

    #[tokio::test]
    async fn test_unavailable_service_passes_packet_through() {
        let service = StubService::new();
        service.available.store(false, Ordering::Relaxed);
        let pipeline = CompressionPipeline::new(PipelineConfig::default(), service.clone());

        let mut packet = test_packet("s1");
        let original = packet.clone();

        let disposition = pipeline.process_rtp_packet(&mut packet).await;
        assert_eq!(
            disposition,
            PacketDisposition::PassedThrough { reason: PassthroughReason::Unavailable }
        );
        assert_eq!(packet, original);
        assert_eq!(service.calls.load(Ordering::Relaxed), 0);

        let stats = pipeline.stats();
        assert_eq!(stats.frames_fallback, 1);
        assert!(stats.is_consistent());
    }

    #[tokio::test]
    async fn test_disabled_pipeline_counts_only_processed() {
        let config = PipelineConfig { enabled: false, ..Default::default() };
        let pipeline = CompressionPipeline::new(config, StubService::new());

        let mut packet = test_packet("s1");
        let original = packet.clone();
        let disposition = pipeline.process_rtp_packet(&mut packet).await;

        assert_eq!(
            disposition,
            PacketDisposition::PassedThrough { reason: PassthroughReason::Disabled }
        );
        assert_eq!(packet, original);
        // No per-session bookkeeping on the disabled fast path
        assert!(pipeline.active_sessions().is_empty());

        let stats = pipeline.stats();
        assert_eq!(stats.packets_processed, 1);
        assert_eq!(stats.disabled_passes, 1);
        assert_eq!(stats.frames_fallback, 0);
        assert!(stats.is_consistent());
    }

    #[tokio::test]
    async fn test_inference_failure_falls_back() {
        let service = StubService::new();
        service.fail.store(true, Ordering::Relaxed);
        let pipeline = CompressionPipeline::new(PipelineConfig::default(), service);

        let mut packet = test_packet("s1");
        let original = packet.clone();
        let disposition = pipeline.process_rtp_packet(&mut packet).await;

        assert_eq!(
            disposition,
            PacketDisposition::PassedThrough { reason: PassthroughReason::Unavailable }
        );
        assert_eq!(packet, original);

        let session = pipeline.session_snapshot("s1").unwrap();
        assert_eq!(session.fallback_frames, 1);
        assert_eq!(session.compressed_frames, 0);
    }

    #[tokio::test]
    async fn test_counter_invariant_over_mixed_traffic() {
        let service = StubService::new();
        let pipeline = CompressionPipeline::new(PipelineConfig::default(), service.clone());

        for i in 0..10 {
            if i == 4 {
                service.fail.store(true, Ordering::Relaxed);
            }
            if i == 7 {
                service.fail.store(false, Ordering::Relaxed);
            }
            let mut packet = test_packet("s1");
            pipeline.process_rtp_packet(&mut packet).await;
        }

        let stats = pipeline.stats();
        assert_eq!(stats.packets_processed, 10);
        assert!(stats.is_consistent());

        let session = pipeline.session_snapshot("s1").unwrap();
        assert_eq!(session.frame_count, 10);
        assert_eq!(session.compressed_frames + session.fallback_frames, 10);
    }

    #[tokio::test]
    async fn test_telemetry_update_drives_mode() {
        let service = StubService::new();
        let pipeline = CompressionPipeline::new(PipelineConfig::default(), service);

        pipeline.update_network_conditions(
            "s1",
            NetworkTelemetry { available_bandwidth_kbps: 500, packet_loss_pct: 1.0, ..Default::default() },
        );

        let snapshot = pipeline.session_snapshot("s1").unwrap();
        assert_eq!(snapshot.telemetry.available_bandwidth_kbps, 500);
    }

    #[tokio::test]
    async fn test_hints_for_unknown_session_are_none() {
        let pipeline = CompressionPipeline::new(PipelineConfig::default(), StubService::new());

        let metadata = FrameMetadata {
            width: 1280,
            height: 720,
            fps: 30,
            codec: "VP8".to_string(),
            keyframe: true,
            presentation_timestamp: 0,
            estimated_bitrate_kbps: 2000,
        };
        assert!(pipeline.get_compression_hints("nobody", metadata).await.is_none());
    }

    #[tokio::test]
    async fn test_hints_for_known_session() {
        let pipeline = CompressionPipeline::new(PipelineConfig::default(), StubService::new());
        let mut packet = test_packet("s1");
        pipeline.process_rtp_packet(&mut packet).await;

        let metadata = FrameMetadata {
            width: 1280,
            height: 720,
            fps: 30,
            codec: "VP8".to_string(),
            keyframe: false,
            presentation_timestamp: 6000,
            estimated_bitrate_kbps: 2000,
        };
        let hints = pipeline.get_compression_hints("s1", metadata).await.unwrap();
        assert_eq!(hints.suggested_bitrate_kbps, 1000);
    }

    #[tokio::test]
    async fn test_end_session_removes_state() {
        let pipeline = CompressionPipeline::new(PipelineConfig::default(), StubService::new());
        let mut packet = test_packet("s1");
        pipeline.process_rtp_packet(&mut packet).await;

        assert!(pipeline.end_session("s1"));
        assert!(!pipeline.end_session("s1"));
        assert!(pipeline.session_snapshot("s1").is_none());
    }

    #[tokio::test]
    async fn test_get_statistics_merges_client_counters() {
        let pipeline = CompressionPipeline::new(PipelineConfig::default(), StubService::new());
        let mut packet = test_packet("s1");
        pipeline.process_rtp_packet(&mut packet).await;

        let map = pipeline.get_statistics().await;
        assert_eq!(map.get("packets_processed").map(String::as_str), Some("1"));
        assert_eq!(map.get("client_requests").map(String::as_str), Some("1"));
        assert_eq!(map.get("service_calls").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn test_decode_error_means_extension_absent() {
        // A consumer reading a corrupted extension treats it as absent
        let pipeline = CompressionPipeline::new(PipelineConfig::default(), StubService::new());
        let mut packet = test_packet("s1");
        pipeline.process_rtp_packet(&mut packet).await;

        let mut corrupted = packet.extension(15).unwrap().to_vec();
        corrupted[0] = 9;
        assert_eq!(
            extension::decode(&corrupted).unwrap_err(),
            ExtensionError::UnsupportedVersion { version: 9 }
        );
        // The packet itself is unaffected
        assert_eq!(packet.payload.len(), 60);
    }
}
