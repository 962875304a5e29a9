//! Core RTP-level types for the slipstream media pipeline
//!
//! This crate holds the transport-facing types shared by the rest of the
//! workspace: the [`MediaPacket`] that flows through the per-packet
//! forwarding path and the scalar type aliases used for RTP header fields.

pub mod packet;

pub use packet::MediaPacket;

/// RTP sequence number (16 bits, wraps)
pub type RtpSequenceNumber = u16;

/// RTP timestamp (32 bits, media clock units)
pub type RtpTimestamp = u32;

/// RTP synchronization source identifier
pub type RtpSsrc = u32;

/// RTP payload type (7 bits used)
pub type RtpPayloadType = u8;
