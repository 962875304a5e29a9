//! Adaptive media compression pipeline
//!
//! This crate sits in the per-packet forwarding path of a real-time media
//! session. For each frame it classifies the frame type, selects a
//! compression aggressiveness mode from the session's network telemetry,
//! hands the frame to an external inference service, and on success embeds
//! the outcome in an RTP header extension so downstream consumers can
//! recover it without renegotiating the session.
//!
//! The pipeline never drops or partially rewrites media: any failure of the
//! assisting service (unavailable, timeout, malformed result) passes the
//! original packet through unchanged and is only recorded in the rolling
//! statistics.

pub mod adaptive;
pub mod classifier;
pub mod error;
pub mod events;
pub mod extension;
pub mod inference;
pub mod pipeline;
pub mod session;
pub mod stats;
pub mod types;

pub use adaptive::{ModeSelector, ModeThresholds};
pub use classifier::FrameClassifier;
pub use error::{CompressionError, ExtensionError, Result};
pub use events::CompressionEvent;
pub use extension::{ExtensionMetadata, COMPRESSION_EXTENSION_ID};
pub use inference::{InferenceClient, InferenceClientConfig, InferenceService};
pub use pipeline::{CompressionPipeline, PacketDisposition, PassthroughReason, PipelineConfig};
pub use session::{SessionRegistry, SessionSnapshot, SessionState};
pub use stats::{PipelineStats, PipelineStatsSnapshot};
pub use types::{
    CompressionHints, CompressionMode, CompressionRequest, CompressionResult, FrameMetadata,
    FrameType, NetworkTelemetry, VideoCodec,
};
