//! Media packet representation
//!
//! A [`MediaPacket`] is one RTP packet already demultiplexed to a session:
//! header fields of interest, the frame payload, and the header extensions
//! exposed as an id -> bytes map using the one-byte extension header format.
//! Consumers that do not recognize an extension id must ignore it, so
//! attaching a new extension never breaks an existing receiver.

use std::collections::HashMap;

use bytes::Bytes;

use crate::{RtpPayloadType, RtpSequenceNumber, RtpSsrc, RtpTimestamp};

/// A media packet in the forwarding path
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPacket {
    /// Identifier of the session this packet belongs to
    pub session_id: String,
    /// Synchronization source of the carrying stream
    pub ssrc: RtpSsrc,
    /// RTP payload type
    pub payload_type: RtpPayloadType,
    /// RTP sequence number (wraps; (session, sequence) orders packets within a session)
    pub sequence_number: RtpSequenceNumber,
    /// RTP capture timestamp
    pub timestamp: RtpTimestamp,
    /// RTP marker bit
    pub marker: bool,
    /// Frame payload
    pub payload: Bytes,
    /// Whether any header extension is present
    pub has_extensions: bool,
    /// Header extensions keyed by one-byte extension id
    pub extensions: HashMap<u8, Bytes>,
}

impl MediaPacket {
    /// Create a new media packet with no extensions and the marker bit clear
    pub fn new(
        session_id: impl Into<String>,
        ssrc: RtpSsrc,
        payload_type: RtpPayloadType,
        sequence_number: RtpSequenceNumber,
        timestamp: RtpTimestamp,
        payload: Bytes,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            ssrc,
            payload_type,
            sequence_number,
            timestamp,
            marker: false,
            payload,
            has_extensions: false,
            extensions: HashMap::new(),
        }
    }

    /// Set the marker bit
    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    /// Attach or replace a header extension
    pub fn set_extension(&mut self, id: u8, data: Bytes) {
        self.extensions.insert(id, data);
        self.has_extensions = true;
    }

    /// Read a header extension by id
    pub fn extension(&self, id: u8) -> Option<&Bytes> {
        self.extensions.get(&id)
    }

    /// Remove a header extension, returning its data if it was present
    pub fn clear_extension(&mut self, id: u8) -> Option<Bytes> {
        let data = self.extensions.remove(&id);
        if self.extensions.is_empty() {
            self.has_extensions = false;
        }
        data
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
