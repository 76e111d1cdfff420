//! # Whisper Model Backend
//!
//! The opaque inference capability behind the registry: a `SpeechModel` trait
//! plus the Candle-backed Whisper implementation of it.
//!
//! ## Model Loading Process:
//! 1. Download model files from HuggingFace if not cached locally
//! 2. Load model weights (safetensors) and tokenizer
//! 3. Initialize model on the configured device (CPU/GPU)
//!
//! Models are loaded once at startup by the registry and never mutated
//! afterwards; the decoder's internal state is guarded by a mutex so a loaded
//! model can be shared freely across concurrent requests.

use anyhow::{anyhow, bail, Result};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use std::sync::Mutex;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::audio::SAMPLE_RATE;

/// The opaque model capability every backend must provide.
///
/// Implementations must be shareable across threads; interior mutability is
/// the implementation's own concern. Errors are reported through `anyhow` and
/// converted to the caller-facing taxonomy by the engine.
pub trait SpeechModel: Send + Sync {
    fn transcribe(&self, samples: &[f32], language: Option<&str>)
        -> Result<TranscriptionOutput>;
}

/// What a model capability produces for one inference call.
#[derive(Debug, Clone)]
pub struct TranscriptionOutput {
    pub text: String,
    pub language: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Available Whisper model sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// HuggingFace model repository for this size.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

// Standard Whisper vocabulary token ids.
const SOT_TOKEN: u32 = 50258;
const EOT_TOKEN: u32 = 50257;
const TRANSCRIBE_TOKEN: u32 = 50359;

/// Maximum tokens emitted for one chunk before decoding stops.
const MAX_DECODE_TOKENS: usize = 200;

/// Whisper expects fixed 30-second input windows.
const WINDOW_SAMPLES: usize = 30 * SAMPLE_RATE as usize;

/// Mel frame count matching the 30-second window.
const MEL_FRAMES: usize = 3000;

/// A loaded Whisper model ready for transcription.
pub struct WhisperModel {
    /// Encoder/decoder state; the decoder mutates its KV cache per call, so
    /// inference on one model instance is serialized behind this mutex.
    model: Mutex<m::model::Whisper>,

    config: Config,
    device: Device,
    tokenizer: Tokenizer,
    size: ModelSize,
}

impl WhisperModel {
    /// Download (or reuse cached) model files and load the weights.
    pub async fn load(size: ModelSize, device: Device) -> Result<Self> {
        info!("Loading Whisper {} model...", size);
        let start_time = std::time::Instant::now();

        let api = {
            use hf_hub::api::tokio::ApiBuilder;
            let mut builder = ApiBuilder::new().with_progress(false);
            if let Ok(token) = std::env::var("HF_TOKEN") {
                builder = builder.with_token(Some(token));
            }
            builder.build()?
        };

        let repo = api.model(size.repo_name().to_string());

        let config_filename = repo
            .get("config.json")
            .await
            .map_err(|e| anyhow!("Failed to download config.json from {}: {}", size.repo_name(), e))?;
        let tokenizer_filename = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| anyhow!("Failed to download tokenizer.json from {}: {}", size.repo_name(), e))?;
        let model_filename = repo
            .get("model.safetensors")
            .await
            .map_err(|e| anyhow!("Failed to download model weights from {}: {}", size.repo_name(), e))?;

        let config: Config = serde_json::from_reader(std::fs::File::open(config_filename)?)?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[model_filename], m::DTYPE, &device)?
        };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        info!(
            "Whisper {} model loaded in {:.2}s",
            size,
            start_time.elapsed().as_secs_f64()
        );

        Ok(Self {
            model: Mutex::new(model),
            config,
            device,
            tokenizer,
            size,
        })
    }

    /// Convert canonical PCM samples into the model's mel input tensor.
    ///
    /// Coarse log-energy features over a fixed 30-second window.
    /// TODO: replace with a real STFT mel frontend once one lands in
    /// candle-transformers for this model family.
    fn pcm_to_mel(&self, pcm: &[f32]) -> Result<Tensor> {
        let mut window = vec![0.0f32; WINDOW_SAMPLES];
        let copy_len = pcm.len().min(WINDOW_SAMPLES);
        window[..copy_len].copy_from_slice(&pcm[..copy_len]);

        let n_mels = self.config.num_mel_bins as usize;
        let frame_size = window.len() / MEL_FRAMES;
        let mut mel = vec![0.0f32; n_mels * MEL_FRAMES];

        for frame in 0..MEL_FRAMES {
            let start = frame * frame_size;
            let end = (start + frame_size).min(window.len());

            let energy: f32 = window[start..end].iter().map(|s| s.abs()).sum();
            // Log scaling with a -80 dB floor.
            let value = (energy / frame_size as f32).ln().max(-11.5129);

            for bin in 0..n_mels {
                mel[bin * MEL_FRAMES + frame] = value;
            }
        }

        Ok(Tensor::from_vec(mel, (n_mels, MEL_FRAMES), &self.device)?)
    }

    /// Greedy token decode against the encoded audio.
    fn decode_tokens(
        &self,
        model: &mut m::model::Whisper,
        encoder_output: &Tensor,
        language: Option<&str>,
    ) -> Result<Vec<u32>> {
        let mut tokens = vec![SOT_TOKEN];
        if let Some(lang) = language {
            if let Some(lang_token) = language_token(lang) {
                tokens.push(lang_token);
            }
        }
        tokens.push(TRANSCRIBE_TOKEN);

        let mut output_tokens = Vec::new();

        for step in 0..MAX_DECODE_TOKENS {
            let input = Tensor::new(&tokens[..], &self.device)?.unsqueeze(0)?;
            // Flush the decoder KV cache on the first step so state from a
            // previous request never leaks into this one.
            let hidden = model.decoder.forward(&input, encoder_output, step == 0)?;
            let (_, seq_len, _) = hidden.dims3()?;
            let logits = model
                .decoder
                .final_linear(&hidden.i((..1, seq_len - 1..))?)?
                .i(0)?
                .i(0)?;
            let next_token = logits.argmax(0)?.to_scalar::<u32>()?;

            if next_token == EOT_TOKEN {
                break;
            }

            if is_repetitive(&output_tokens, next_token) {
                break;
            }

            tokens.push(next_token);
            output_tokens.push(next_token);
        }

        Ok(output_tokens)
    }

    fn tokens_to_text(&self, tokens: &[u32]) -> Result<String> {
        let text = self
            .tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;

        let cleaned = text
            .replace("<|startoftranscript|>", "")
            .replace("<|endoftext|>", "")
            .replace("<|notimestamps|>", "");

        Ok(cleaned.trim().to_string())
    }
}

impl SpeechModel for WhisperModel {
    fn transcribe(&self, samples: &[f32], language: Option<&str>) -> Result<TranscriptionOutput> {
        if samples.is_empty() {
            bail!("audio buffer is empty");
        }

        let start_time = std::time::Instant::now();
        let mel = self.pcm_to_mel(samples)?.unsqueeze(0)?;

        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow!("model state poisoned by a previous panic"))?;

        let encoder_output = model.encoder.forward(&mel, true)?;
        let tokens = self.decode_tokens(&mut model, &encoder_output, language)?;
        drop(model);

        let text = self.tokens_to_text(&tokens)?;
        let duration = samples.len() as f64 / SAMPLE_RATE as f64;

        debug!(
            "Transcribed {:.2}s of audio in {:.2}s: '{}'",
            duration,
            start_time.elapsed().as_secs_f64(),
            text
        );

        let mut metadata = serde_json::Map::new();
        metadata.insert("duration".into(), duration.into());
        metadata.insert("tokens".into(), tokens.len().into());
        metadata.insert("model_size".into(), self.size.to_string().into());

        Ok(TranscriptionOutput {
            text,
            language: language.unwrap_or("en").to_string(),
            metadata,
        })
    }
}

/// Whisper vocabulary token for a language hint, when we know it.
fn language_token(language: &str) -> Option<u32> {
    match language.to_lowercase().as_str() {
        "en" | "english" => Some(50259),
        "zh" | "chinese" => Some(50260),
        "de" | "german" => Some(50261),
        "es" | "spanish" => Some(50262),
        "ru" | "russian" => Some(50263),
        "ko" | "korean" => Some(50264),
        "fr" | "french" => Some(50265),
        "ja" | "japanese" => Some(50266),
        "pt" | "portuguese" => Some(50267),
        "it" | "italian" => Some(50274),
        _ => None,
    }
}

/// Detect degenerate decode loops (same token or same 3-gram repeating).
fn is_repetitive(tokens: &[u32], new_token: u32) -> bool {
    let n = tokens.len();

    // Appending new_token would make three identical tokens in a row.
    if n >= 2 && tokens[n - 2..] == [new_token, new_token] {
        return true;
    }

    // Appending new_token would make the trailing 3-gram repeat itself.
    if n >= 5 {
        let last = [tokens[n - 2], tokens[n - 1], new_token];
        if tokens[n - 5..n - 2] == last {
            return true;
        }
    }

    false
}
