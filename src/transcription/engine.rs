//! # Transcription Engine
//!
//! A thin adapter around one model capability with a uniform input/output
//! contract. The engine does exactly three things:
//!
//! - runs the (CPU-bound) model call on a blocking worker so it never stalls
//!   other sessions
//! - converts any backend failure into `ApiError::Inference` instead of
//!   letting it crash the caller
//! - attaches the name of the model that actually served the request
//!
//! No retries, no output rewriting, no timeouts. A hang in the underlying
//! model hangs this call; that is a documented gap, not something the engine
//! papers over.

use crate::audio::CanonicalAudio;
use crate::error::{ApiError, ApiResult};
use crate::transcription::model::SpeechModel;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// One inference call's outcome, shaped for response formatting.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResult {
    /// The transcribed text
    pub text: String,

    /// Language used for transcription (hint or default)
    pub language: String,

    /// Backend-specific extras (duration, token counts, ...)
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Name of the model that actually served the request
    pub model: String,
}

/// Adapter binding a registry name to a shared model capability.
///
/// Cloning is cheap (the model is behind `Arc`), which is what lets the
/// registry hand out engines without any locking.
#[derive(Clone)]
pub struct TranscriptionEngine {
    name: String,
    model: Arc<dyn SpeechModel>,
}

impl TranscriptionEngine {
    pub fn new(name: impl Into<String>, model: Arc<dyn SpeechModel>) -> Self {
        Self {
            name: name.into(),
            model,
        }
    }

    /// Name this engine is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Transcribe one canonical audio buffer.
    ///
    /// The buffer is consumed: it was produced fresh for this call and has no
    /// other owner. Errors cover exactly this call; the caller's session or
    /// connection stays usable.
    pub async fn transcribe(
        &self,
        audio: CanonicalAudio,
        language: Option<String>,
    ) -> ApiResult<TranscriptionResult> {
        debug!(
            model = %self.name,
            duration_secs = audio.duration_secs(),
            "Starting transcription"
        );

        let model = Arc::clone(&self.model);
        let output = tokio::task::spawn_blocking(move || {
            model.transcribe(&audio.samples, language.as_deref())
        })
        .await? // panicked worker -> ApiError::Internal
        .map_err(|e| ApiError::Inference(e.to_string()))?;

        Ok(TranscriptionResult {
            text: output.text,
            language: output.language,
            metadata: output.metadata,
            model: self.name.clone(),
        })
    }
}
