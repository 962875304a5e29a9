//! Compression metadata header extension codec
//!
//! Serializes the outcome of a compression pass into a fixed 16-byte header
//! extension so receivers can recover it without renegotiation. All
//! integers are big-endian; the fractional values use fixed-point
//! thousandths so encoder and decoder agree bit-for-bit across platforms
//! and implementations.
//!
//! Wire layout (16 bytes):
//!
//! | bytes | field                                      |
//! |-------|--------------------------------------------|
//! | 0     | format version (currently 1)               |
//! | 1-2   | compression ratio, i16, scaled by 1000     |
//! | 3-4   | quality score, i16, scaled by 1000         |
//! | 5-8   | FNV-1a 32-bit hash of the model identifier |
//! | 9     | flags (bit 0 = fallback used)              |
//! | 10-15 | reserved, zero on encode, ignored on decode |

use crate::error::ExtensionError;
use crate::types::CompressionResult;

/// One-byte extension id reserved for compression metadata in this deployment
pub const COMPRESSION_EXTENSION_ID: u8 = 15;

/// Current wire format version
pub const EXTENSION_VERSION: u8 = 1;

/// Fixed encoded size in bytes
pub const EXTENSION_LEN: usize = 16;

const FIXED_POINT_SCALE: i32 = 1000;
const FLAG_FALLBACK: u8 = 0b0000_0001;

/// The subset of a compression result that rides the wire
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionMetadata {
    /// Achieved compression ratio (compressed / original)
    pub ratio: f32,
    /// Model-reported quality score
    pub quality_score: f32,
    /// 32-bit hash of the model identifier string
    pub model_hash: u32,
    /// Whether the sender fell back to the uncompressed payload
    pub fallback: bool,
}

impl ExtensionMetadata {
    /// Build wire metadata from a compression result
    pub fn from_result(result: &CompressionResult) -> Self {
        Self {
            ratio: result.ratio,
            quality_score: result.quality_score,
            model_hash: hash_model_id(&result.model_id),
            fallback: result.fallback_used,
        }
    }
}

/// Encode metadata into the fixed 16-byte wire layout.
///
/// Never fails: values outside the representable fixed-point range
/// (|value| > 32.767) are clamped to the i16 range. Clamping is contract
/// behavior, not data loss to diagnose.
pub fn encode(metadata: &ExtensionMetadata) -> [u8; EXTENSION_LEN] {
    let mut buf = [0u8; EXTENSION_LEN];
    buf[0] = EXTENSION_VERSION;
    buf[1..3].copy_from_slice(&to_fixed_point(metadata.ratio).to_be_bytes());
    buf[3..5].copy_from_slice(&to_fixed_point(metadata.quality_score).to_be_bytes());
    buf[5..9].copy_from_slice(&metadata.model_hash.to_be_bytes());
    if metadata.fallback {
        buf[9] |= FLAG_FALLBACK;
    }
    // bytes 10-15 stay zero (reserved)
    buf
}

/// Decode the fixed 16-byte wire layout.
///
/// A short buffer or an unrecognized version yields an error; callers must
/// treat the extension as absent, never as fatal. Reserved bytes are
/// ignored so a future version can assign them.
pub fn decode(data: &[u8]) -> Result<ExtensionMetadata, ExtensionError> {
    if data.len() < EXTENSION_LEN {
        return Err(ExtensionError::TooShort {
            needed: EXTENSION_LEN,
            actual: data.len(),
        });
    }

    let version = data[0];
    if version != EXTENSION_VERSION {
        return Err(ExtensionError::UnsupportedVersion { version });
    }

    Ok(ExtensionMetadata {
        ratio: from_fixed_point(i16::from_be_bytes([data[1], data[2]])),
        quality_score: from_fixed_point(i16::from_be_bytes([data[3], data[4]])),
        model_hash: u32::from_be_bytes([data[5], data[6], data[7], data[8]]),
        fallback: data[9] & FLAG_FALLBACK != 0,
    })
}

/// Scale to thousandths, clamped to the representable i16 range
fn to_fixed_point(value: f32) -> i16 {
    let scaled = (value * FIXED_POINT_SCALE as f32).round() as i64;
    scaled.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

fn from_fixed_point(raw: i16) -> f32 {
    raw as f32 / FIXED_POINT_SCALE as f32
}

/// FNV-1a 32-bit hash of the model identifier.
///
/// Stable across platforms and implementation languages, which is what the
/// wire format needs; this is not a collision-resistant digest.
pub fn hash_model_id(model_id: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in model_id.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}
