//! # Chunking and Wire Encoding
//!
//! Helpers for the raw-sample wire format: splitting a sample buffer into
//! fixed-size chunks for streaming, and converting between f32 sample buffers
//! and the base64 little-endian byte representation carried in
//! `audio_ndarray` fields.

use byteorder::{ByteOrder, LittleEndian};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Split a sample buffer into chunks of at most `chunk_size` samples.
///
/// The final chunk may be shorter than `chunk_size` when the buffer length is
/// not an exact multiple; that is normal and never an error. `chunk_size`
/// must be at least 1.
pub fn split_samples(samples: &[f32], chunk_size: usize) -> Vec<Vec<f32>> {
    assert!(chunk_size >= 1, "chunk_size must be at least 1");
    samples.chunks(chunk_size).map(<[f32]>::to_vec).collect()
}

/// Encode a sample buffer to its base64 wire representation
/// (little-endian f32 bytes).
pub fn samples_to_base64(samples: &[f32]) -> String {
    let mut bytes = vec![0u8; samples.len() * 4];
    LittleEndian::write_f32_into(samples, &mut bytes);
    BASE64.encode(bytes)
}

/// Decode the base64 wire representation back into a sample buffer.
///
/// Returns an error description when the base64 is malformed or the decoded
/// byte count is not a whole number of f32 samples.
pub fn samples_from_base64(encoded: &str) -> Result<Vec<f32>, String> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| format!("invalid base64: {}", e))?;

    if bytes.len() % 4 != 0 {
        return Err(format!(
            "byte length {} is not a multiple of 4 (expected little-endian f32 samples)",
            bytes.len()
        ));
    }

    let mut samples = vec![0f32; bytes.len() / 4];
    LittleEndian::read_f32_into(&bytes, &mut samples);
    Ok(samples)
}
