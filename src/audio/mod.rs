//! # Audio Normalization Module
//!
//! Everything upstream of inference: turning the four accepted audio input
//! variants into one canonical representation, plus the chunking helpers used
//! by the streaming wire format.
//!
//! ## Canonical Audio Format:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: 32-bit float, every sample in [-1.0, 1.0]
//!
//! Every component downstream of this module may assume that format without
//! re-validating it.

pub mod chunk;  // Sample splitting and base64 wire encoding
pub mod decode; // Tagged-union audio sources and normalization

/// The one sample rate all inference logic consumes.
pub const SAMPLE_RATE: u32 = 16_000;

/// Canonical audio is always single-channel.
pub const CHANNELS: u16 = 1;

/// A normalized buffer of audio samples: mono, 16 kHz, f32, range-bounded.
///
/// Produced fresh per request or per streaming chunk by the decode paths and
/// consumed once by the transcription engine; never shared or cached.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalAudio {
    pub samples: Vec<f32>,
}

impl CanonicalAudio {
    pub fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    /// Duration of the buffer in seconds at the canonical sample rate.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / SAMPLE_RATE as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
