//! Concurrent per-session state registry
//!
//! Owns every piece of mutable session state in the pipeline. The map is
//! sharded (DashMap), so packet processing for unrelated sessions never
//! contends on a common lock, and no guard is ever held across an await
//! point. Sessions are created lazily on first sight and removed either by
//! the idle eviction sweep or by an explicit session-end notification;
//! removal is eventually-consistent, an in-flight packet for a session
//! mid-removal simply recreates its state.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::events::CompressionEvent;
use crate::types::NetworkTelemetry;

/// Idle time after which a session is swept
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Cadence of the background eviction sweep
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Mutable state tracked for one media session
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Last time a packet or telemetry update touched this session
    pub last_activity: Instant,
    /// Latest network telemetry snapshot
    pub telemetry: NetworkTelemetry,
    /// Monotonically increasing frame counter
    pub frame_count: u64,
    /// Frames successfully compressed
    pub compressed_frames: u64,
    /// Frames passed through on fallback
    pub fallback_frames: u64,
    /// Sum of achieved compression ratios, for averaging
    pub ratio_sum: f64,
}

impl SessionState {
    fn new(now: Instant) -> Self {
        Self {
            last_activity: now,
            telemetry: NetworkTelemetry::default(),
            frame_count: 0,
            compressed_frames: 0,
            fallback_frames: 0,
            ratio_sum: 0.0,
        }
    }

    /// Average achieved compression ratio across compressed frames
    pub fn average_ratio(&self) -> f64 {
        if self.compressed_frames == 0 {
            0.0
        } else {
            self.ratio_sum / self.compressed_frames as f64
        }
    }
}

/// Read-only snapshot of one session's state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Session identifier
    pub session_id: String,
    /// Latest telemetry
    pub telemetry: NetworkTelemetry,
    /// Frames seen
    pub frame_count: u64,
    /// Frames compressed
    pub compressed_frames: u64,
    /// Frames passed through on fallback
    pub fallback_frames: u64,
    /// Average achieved compression ratio
    pub average_ratio: f64,
}

/// Concurrent store of per-session compression state
pub struct SessionRegistry {
    /// Active sessions, sharded by key
    sessions: DashMap<String, SessionState>,
    /// Lifecycle event sink
    event_tx: mpsc::UnboundedSender<CompressionEvent>,
}

impl SessionRegistry {
    /// Create an empty registry emitting lifecycle events on `event_tx`
    pub fn new(event_tx: mpsc::UnboundedSender<CompressionEvent>) -> Self {
        Self {
            sessions: DashMap::new(),
            event_tx,
        }
    }

    /// Fetch or lazily create a session, bumping its activity time and frame
    /// counter. Returns the telemetry snapshot and the frame number assigned
    /// to the current packet.
    pub fn get_or_create(&self, session_id: &str) -> (NetworkTelemetry, u64) {
        let mut state = self.sessions.entry(session_id.to_string()).or_insert_with(|| {
            debug!("Creating session state for {}", session_id);
            let _ = self.event_tx.send(CompressionEvent::SessionCreated {
                session_id: session_id.to_string(),
            });
            SessionState::new(Instant::now())
        });

        state.last_activity = Instant::now();
        state.frame_count += 1;
        (state.telemetry, state.frame_count)
    }

    /// Replace a session's telemetry snapshot, creating the session if the
    /// measurement component reports before the first packet arrives
    pub fn update_telemetry(&self, session_id: &str, telemetry: NetworkTelemetry) {
        let mut state = self.sessions.entry(session_id.to_string()).or_insert_with(|| {
            let _ = self.event_tx.send(CompressionEvent::SessionCreated {
                session_id: session_id.to_string(),
            });
            SessionState::new(Instant::now())
        });

        state.telemetry = telemetry;
        state.last_activity = Instant::now();
        debug!(
            "Updated telemetry for {}: {} kbps, {:.1}% loss",
            session_id, telemetry.available_bandwidth_kbps, telemetry.packet_loss_pct
        );
    }

    /// Record a successful compression for a session
    pub fn record_compression(&self, session_id: &str, ratio: f32) {
        if let Some(mut state) = self.sessions.get_mut(session_id) {
            state.compressed_frames += 1;
            state.ratio_sum += f64::from(ratio);
        }
    }

    /// Record a fallback pass-through for a session
    pub fn record_fallback(&self, session_id: &str) {
        if let Some(mut state) = self.sessions.get_mut(session_id) {
            state.fallback_frames += 1;
        }
    }

    /// Whether a session currently has state
    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Number of active sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Identifiers of all active sessions
    pub fn active_sessions(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Snapshot a session's counters
    pub fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.sessions.get(session_id).map(|state| SessionSnapshot {
            session_id: session_id.to_string(),
            telemetry: state.telemetry,
            frame_count: state.frame_count,
            compressed_frames: state.compressed_frames,
            fallback_frames: state.fallback_frames,
            average_ratio: state.average_ratio(),
        })
    }

    /// Remove a session explicitly (control-plane session end).
    /// Returns whether the session existed.
    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            debug!("Removed session {} on control-plane notification", session_id);
            let _ = self.event_tx.send(CompressionEvent::SessionEnded {
                session_id: session_id.to_string(),
            });
        }
        removed
    }

    /// Remove sessions idle longer than `idle_timeout`, returning the
    /// removed identifiers.
    ///
    /// The scan collects candidates first and re-checks each under its shard
    /// lock, so a session touched between scan and removal survives.
    pub fn sweep_idle(&self, now: Instant, idle_timeout: Duration) -> Vec<String> {
        let candidates: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| now.duration_since(entry.value().last_activity) > idle_timeout)
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = Vec::with_capacity(candidates.len());
        for session_id in candidates {
            let evicted = self
                .sessions
                .remove_if(&session_id, |_, state| {
                    now.duration_since(state.last_activity) > idle_timeout
                })
                .is_some();

            if evicted {
                info!("Evicted idle session {}", session_id);
                let _ = self.event_tx.send(CompressionEvent::SessionEvicted {
                    session_id: session_id.clone(),
                });
                removed.push(session_id);
            }
        }

        removed
    }
}
