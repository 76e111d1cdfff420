//! # Audio Source Decoding
//!
//! Accepts audio in four input variants and normalizes all of them to
//! [`CanonicalAudio`]. The variant is picked *before* dispatch by
//! [`AudioSource::from_parts`], so the priority order between the optional
//! request fields is an explicit, testable contract instead of fall-through
//! checks scattered across handlers.
//!
//! ## Decode Paths:
//! - **EncodedFile / EncodedBase64**: container audio (WAV/MP3/FLAC/OGG/…),
//!   format auto-detected by symphonia, downmixed to mono, resampled to
//!   16 kHz, scaled to f32
//! - **RawSampleBase64**: little-endian f32 samples, already 16 kHz mono by
//!   caller contract; only base64 and byte-width validation happen here
//! - **RemoteUrl**: one HTTP GET, body treated as EncodedFile; no retries
//!
//! ## PCM Scaling:
//! Integer PCM is divided by 32768, the signed 16-bit full-scale value,
//! regardless of the source container's declared bit depth. Sources are first
//! brought to 16-bit width by the symphonia sample converter, so the output
//! stays inside [-1, 1] for every bit depth while keeping the original
//! service's fixed divisor.

use crate::audio::{CanonicalAudio, SAMPLE_RATE};
use crate::error::{ApiError, ApiResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Signed 16-bit full-scale value used to rescale integer PCM to f32.
const PCM_FULL_SCALE: f32 = 32768.0;

/// A single audio input with exactly one populated variant.
///
/// Requests may carry several optional audio fields; this enum is the result
/// of resolving them in the documented priority order.
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Container-format audio bytes (uploaded file)
    EncodedFile(Vec<u8>),

    /// Container-format audio, base64-wrapped
    EncodedBase64(String),

    /// Raw little-endian f32 samples, base64-wrapped (16 kHz mono by contract)
    RawSampleBase64(String),

    /// HTTP(S) URL pointing at container-format audio
    RemoteUrl(String),
}

impl AudioSource {
    /// Resolve the optional request fields into one source.
    ///
    /// Priority order: uploaded file > URL > encoded base64 > raw samples.
    /// Empty strings count as absent, matching how the original service
    /// treated blank form fields. No populated field at all is an input
    /// error, reported before any decoding starts.
    pub fn from_parts(
        file: Option<Vec<u8>>,
        url: Option<String>,
        encoded_base64: Option<String>,
        raw_base64: Option<String>,
    ) -> ApiResult<Self> {
        if let Some(bytes) = file.filter(|b| !b.is_empty()) {
            return Ok(AudioSource::EncodedFile(bytes));
        }
        if let Some(url) = url.filter(|s| !s.is_empty()) {
            return Ok(AudioSource::RemoteUrl(url));
        }
        if let Some(b64) = encoded_base64.filter(|s| !s.is_empty()) {
            return Ok(AudioSource::EncodedBase64(b64));
        }
        if let Some(b64) = raw_base64.filter(|s| !s.is_empty()) {
            return Ok(AudioSource::RawSampleBase64(b64));
        }

        Err(ApiError::Input("No valid audio input provided.".to_string()))
    }
}

/// Decode any audio source into canonical samples.
///
/// Container decoding is CPU-bound and runs on a blocking worker so it never
/// stalls unrelated sessions; the raw-sample path is cheap enough to run
/// inline.
pub async fn decode(source: AudioSource) -> ApiResult<CanonicalAudio> {
    match source {
        AudioSource::EncodedFile(bytes) => decode_container_off_thread(bytes).await,
        AudioSource::EncodedBase64(b64) => {
            let bytes = BASE64
                .decode(b64.as_bytes())
                .map_err(|e| ApiError::Decode(format!("invalid base64: {}", e)))?;
            decode_container_off_thread(bytes).await
        }
        AudioSource::RawSampleBase64(b64) => decode_raw_samples(&b64),
        AudioSource::RemoteUrl(url) => {
            let bytes = fetch_remote(&url).await?;
            decode_container_off_thread(bytes).await
        }
    }
}

/// Decode base64-wrapped raw f32 samples.
///
/// No resampling or channel conversion happens here: the caller is
/// responsible for having produced 16 kHz mono f32 already.
pub fn decode_raw_samples(b64: &str) -> ApiResult<CanonicalAudio> {
    let samples = crate::audio::chunk::samples_from_base64(b64).map_err(ApiError::Decode)?;
    Ok(CanonicalAudio::new(samples))
}

/// Fetch remote audio bytes with a single GET request.
async fn fetch_remote(url: &str) -> ApiResult<Vec<u8>> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| ApiError::Fetch(format!("GET {} failed: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(ApiError::Fetch(format!(
            "GET {} returned status {}",
            url,
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::Fetch(format!("reading body of {} failed: {}", url, e)))?;

    Ok(bytes.to_vec())
}

async fn decode_container_off_thread(bytes: Vec<u8>) -> ApiResult<CanonicalAudio> {
    tokio::task::spawn_blocking(move || decode_container(&bytes)).await?
}

/// Decode container-format audio bytes to canonical samples.
///
/// ## Pipeline:
/// 1. Probe the container format from content (no filename hint needed)
/// 2. Decode packets to interleaved 16-bit PCM
/// 3. Downmix multi-channel frames by averaging
/// 4. Rescale by the fixed 16-bit full-scale divisor
/// 5. Resample to 16 kHz when the source rate differs
pub fn decode_container(bytes: &[u8]) -> ApiResult<CanonicalAudio> {
    let cursor = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let hint = Hint::new();
    let format_opts = FormatOptions::default();
    let metadata_opts = MetadataOptions::default();
    let decoder_opts = DecoderOptions::default();

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &metadata_opts)
        .map_err(|e| ApiError::Decode(format!("unrecognized audio format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| ApiError::Decode("no audio track found".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let source_rate = codec_params
        .sample_rate
        .ok_or_else(|| ApiError::Decode("unknown sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &decoder_opts)
        .map_err(|e| ApiError::Decode(format!("unsupported codec: {}", e)))?;

    let mut mono: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                return Err(ApiError::Decode(format!("packet read failed: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                tracing::warn!(error = %e, "Skipping corrupt audio frame");
                continue;
            }
            Err(e) => {
                return Err(ApiError::Decode(format!("frame decode failed: {}", e)));
            }
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();
        if num_frames == 0 {
            continue;
        }

        // Bring every source to 16-bit width, then apply the fixed divisor.
        let mut sample_buf = SampleBuffer::<i16>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        let samples = sample_buf.samples();

        let channels = spec.channels.count().max(1);
        if channels > 1 {
            for frame in samples.chunks(channels) {
                let sum: f32 = frame.iter().map(|&s| s as f32 / PCM_FULL_SCALE).sum();
                mono.push(sum / channels as f32);
            }
        } else {
            mono.extend(samples.iter().map(|&s| s as f32 / PCM_FULL_SCALE));
        }
    }

    if mono.is_empty() {
        return Err(ApiError::Decode("no audio samples decoded".to_string()));
    }

    if source_rate != SAMPLE_RATE {
        mono = resample(&mono, source_rate, SAMPLE_RATE)?;
    }

    debug!(
        samples = mono.len(),
        duration_secs = mono.len() as f32 / SAMPLE_RATE as f32,
        source_rate,
        "Audio normalized to canonical format"
    );

    Ok(CanonicalAudio::new(mono))
}

/// Resample a mono buffer between sample rates.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> ApiResult<Vec<f32>> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let chunk_size = 1024;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1)
        .map_err(|e| ApiError::Decode(format!("resampler init failed: {}", e)))?;

    let mut output = Vec::with_capacity((samples.len() as f64 * ratio) as usize + chunk_size);

    for chunk in samples.chunks(chunk_size) {
        // The resampler requires full chunks; zero-pad the tail.
        let input = if chunk.len() < chunk_size {
            let mut padded = chunk.to_vec();
            padded.resize(chunk_size, 0.0);
            padded
        } else {
            chunk.to_vec()
        };

        let result = resampler
            .process(&[input], None)
            .map_err(|e| ApiError::Decode(format!("resampling failed: {}", e)))?;

        if let Some(channel) = result.first() {
            output.extend_from_slice(channel);
        }
    }

    let expected_len = (samples.len() as f64 * ratio) as usize;
    output.truncate(expected_len);

    Ok(output)
}
