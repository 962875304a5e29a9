//! Rolling pipeline statistics
//!
//! Lock-free counters updated from every packet-processing context.
//! Invariant: `packets_processed == frames_compressed + frames_fallback +
//! disabled_passes` at any observation point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Rolling counters for the compression pipeline
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Packets seen by the pipeline
    packets_processed: AtomicU64,
    /// Frames whose payload was replaced with compressed bytes
    frames_compressed: AtomicU64,
    /// Frames passed through after an inference failure
    frames_fallback: AtomicU64,
    /// Packets passed through because the feature is disabled
    disabled_passes: AtomicU64,
    /// Original payload bytes of compressed frames
    bytes_in: AtomicU64,
    /// Bytes saved by compression (original - compressed)
    bytes_saved: AtomicU64,
}

impl PipelineStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a packet entering the pipeline
    pub fn record_processed(&self) {
        self.packets_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a successful compression
    pub fn record_compressed(&self, original_size: usize, compressed_size: usize) {
        self.frames_compressed.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(original_size as u64, Ordering::Relaxed);
        self.bytes_saved
            .fetch_add(original_size.saturating_sub(compressed_size) as u64, Ordering::Relaxed);
    }

    /// Count a fallback pass-through
    pub fn record_fallback(&self) {
        self.frames_fallback.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a disabled-feature pass-through
    pub fn record_disabled_pass(&self) {
        self.disabled_passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            packets_processed: self.packets_processed.load(Ordering::Relaxed),
            frames_compressed: self.frames_compressed.load(Ordering::Relaxed),
            frames_fallback: self.frames_fallback.load(Ordering::Relaxed),
            disabled_passes: self.disabled_passes.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_saved: self.bytes_saved.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the pipeline counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatsSnapshot {
    /// Packets seen by the pipeline
    pub packets_processed: u64,
    /// Frames compressed
    pub frames_compressed: u64,
    /// Frames passed through on fallback
    pub frames_fallback: u64,
    /// Packets passed through with the feature disabled
    pub disabled_passes: u64,
    /// Original payload bytes of compressed frames
    pub bytes_in: u64,
    /// Bytes saved by compression
    pub bytes_saved: u64,
}

impl PipelineStatsSnapshot {
    /// Key/value form for the polled statistics surface
    pub fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            ("packets_processed".to_string(), self.packets_processed.to_string()),
            ("frames_compressed".to_string(), self.frames_compressed.to_string()),
            ("frames_fallback".to_string(), self.frames_fallback.to_string()),
            ("disabled_passes".to_string(), self.disabled_passes.to_string()),
            ("bytes_in".to_string(), self.bytes_in.to_string()),
            ("bytes_saved".to_string(), self.bytes_saved.to_string()),
        ])
    }

    /// Whether the counter invariant holds for this snapshot
    pub fn is_consistent(&self) -> bool {
        self.packets_processed == self.frames_compressed + self.frames_fallback + self.disabled_passes
    }
}
