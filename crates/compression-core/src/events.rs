//! Pipeline event definitions
//!
//! Session lifecycle notifications emitted over an unbounded channel so the
//! embedding process can observe the registry without polling it.

/// Events emitted by the compression pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressionEvent {
    /// Session state was created on first packet or telemetry update
    SessionCreated {
        /// Identifier of the new session
        session_id: String,
    },
    /// Session was removed by the idle eviction sweep
    SessionEvicted {
        /// Identifier of the evicted session
        session_id: String,
    },
    /// Session was removed by explicit control-plane notification
    SessionEnded {
        /// Identifier of the ended session
        session_id: String,
    },
}
