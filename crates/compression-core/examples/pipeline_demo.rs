//! Compression pipeline demo
//!
//! Runs a handful of packets for two sessions through the pipeline against
//! a mock inference service and prints the resulting statistics.
//!
//! Usage: cargo run --example pipeline_demo

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use slipstream_compression_core::{
    CompressionHints, CompressionPipeline, CompressionRequest, CompressionResult,
    InferenceService, NetworkTelemetry, PipelineConfig, Result,
};
use slipstream_rtp_core::MediaPacket;

/// Mock inference service standing in for the real compression backend
struct DemoService;

#[async_trait]
impl InferenceService for DemoService {
    async fn initialize(&self) -> Result<()> {
        info!("Demo inference service initialized");
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn compress_frame(&self, request: &CompressionRequest) -> Option<CompressionResult> {
        let target = (request.frame_data.len() as f32 * request.target_ratio) as usize;
        let compressed = Bytes::from(vec![0xd5; target.max(1)]);
        Some(CompressionResult {
            success: true,
            original_size: request.frame_data.len(),
            compressed_size: compressed.len(),
            compressed_data: compressed,
            ratio: request.target_ratio,
            quality_score: 0.92,
            model_id: "demo-model-1".to_string(),
            fallback_used: false,
            fallback_reason: None,
            processing_time: Duration::from_millis(2),
        })
    }

    async fn compression_hints(&self, request: &CompressionRequest) -> Option<CompressionHints> {
        Some(CompressionHints {
            suggested_bitrate_kbps: request.telemetry.available_bandwidth_kbps * 3 / 4,
            suggested_quality: 0.9,
            suggested_mode: request.mode,
        })
    }

    async fn statistics(&self) -> HashMap<String, String> {
        HashMap::from([("model".to_string(), "demo-model-1".to_string())])
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let pipeline = CompressionPipeline::new(PipelineConfig::default(), Arc::new(DemoService));
    pipeline.start().await.expect("pipeline start");

    // One session on a starved link, one on a comfortable link
    pipeline.update_network_conditions(
        "demo/starved",
        NetworkTelemetry { available_bandwidth_kbps: 600, packet_loss_pct: 2.0, ..Default::default() },
    );
    pipeline.update_network_conditions(
        "demo/comfortable",
        NetworkTelemetry { available_bandwidth_kbps: 6000, packet_loss_pct: 0.2, ..Default::default() },
    );

    for seq in 0..50u16 {
        for session_id in ["demo/starved", "demo/comfortable"] {
            let mut packet = MediaPacket::new(
                session_id,
                0xd390,
                96,
                seq,
                u32::from(seq) * 3000,
                Bytes::from(vec![0x3c; 1200]),
            );
            let disposition = pipeline.process_rtp_packet(&mut packet).await;
            if seq == 0 {
                info!("{}: first packet -> {:?}", session_id, disposition);
            }
        }
    }

    for (key, value) in pipeline.get_statistics().await {
        info!("{} = {}", key, value);
    }

    pipeline.stop().await;
}
