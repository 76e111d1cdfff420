//! # Single-Shot Transcription Handler
//!
//! `POST /transcribe` accepts one complete audio input as a multipart form,
//! runs the full normalize → lookup → transcribe pipeline exactly once, and
//! shapes the result into one of three output formats.
//!
//! ## Form Fields:
//! - `audio_file` | `audio_url` | `audio_base64` | `audio_ndarray`: the audio
//!   source, resolved in that priority order (exactly one is used)
//! - `model`: required model name
//! - `language`: optional language hint
//! - `output_format`: `text`, `json` (default) or `json_metadata`
//!
//! Missing/undecodable audio is a 400, an unknown model is a 404, both with
//! `{"error": "..."}` bodies via the `ApiError` conversion.

use crate::audio::decode::{decode, AudioSource};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::transcription::TranscriptionResult;
use actix_multipart::form::{bytes::Bytes, text::Text, MultipartForm};
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::info;

/// Multipart form carried by a single-shot transcription request.
#[derive(Debug, MultipartForm)]
pub struct TranscribeForm {
    /// Uploaded container-format audio bytes
    #[multipart(limit = "100MB")]
    pub audio_file: Option<Bytes>,

    /// URL of remote container-format audio
    pub audio_url: Option<Text<String>>,

    /// Base64-wrapped container-format audio
    pub audio_base64: Option<Text<String>>,

    /// Base64-wrapped raw f32 samples (16 kHz mono)
    pub audio_ndarray: Option<Text<String>>,

    /// Required model name
    pub model: Text<String>,

    /// Optional language hint
    pub language: Option<Text<String>>,

    /// Output format selector (defaults to "json")
    pub output_format: Option<Text<String>>,
}

/// The three response shapes a caller can ask for.
///
/// Unrecognized tokens fall back to `Json`, matching the original service's
/// behavior of treating anything unknown as the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain-text body containing only the transcribed text
    Text,
    /// Minimal `{text, language, model}` JSON
    Json,
    /// Full result fields plus the serving model name
    JsonMetadata,
}

impl OutputFormat {
    pub fn parse(token: Option<&str>) -> Self {
        match token {
            Some("text") => OutputFormat::Text,
            Some("json_metadata") => OutputFormat::JsonMetadata,
            _ => OutputFormat::Json,
        }
    }
}

/// `POST /transcribe`
pub async fn transcribe(
    form: MultipartForm<TranscribeForm>,
    state: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let form = form.into_inner();

    let source = AudioSource::from_parts(
        form.audio_file.map(|b| b.data.to_vec()),
        form.audio_url.map(Text::into_inner),
        form.audio_base64.map(Text::into_inner),
        form.audio_ndarray.map(Text::into_inner),
    )?;

    let model_name = form.model.into_inner();
    let language = form.language.map(Text::into_inner);
    let format = OutputFormat::parse(form.output_format.as_deref().map(String::as_str));

    let result = run_transcription(&state, source, &model_name, language).await?;

    info!(
        model = %result.model,
        chars = result.text.len(),
        "Single-shot transcription completed"
    );

    Ok(shape_response(result, format))
}

/// The single-shot pipeline: normalization, registry lookup, one inference.
///
/// Audio is decoded first, so a request with both a bad payload and an
/// unknown model name reports the decode error.
pub(crate) async fn run_transcription(
    state: &AppState,
    source: AudioSource,
    model_name: &str,
    language: Option<String>,
) -> ApiResult<TranscriptionResult> {
    let audio = decode(source).await?;

    let engine = state
        .registry
        .get(model_name)
        .ok_or_else(|| ApiError::ModelNotFound(model_name.to_string()))?;

    engine.transcribe(audio, language).await
}

/// Shape a transcription result into the requested response format.
pub(crate) fn shape_response(result: TranscriptionResult, format: OutputFormat) -> HttpResponse {
    match format {
        OutputFormat::Text => HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body(result.text),
        OutputFormat::Json => HttpResponse::Ok().json(json!({
            "text": result.text,
            "language": result.language,
            "model": result.model,
        })),
        OutputFormat::JsonMetadata => {
            // Metadata fields are lifted to the top level alongside the
            // standard fields, mirroring the full-result wire shape.
            let mut body = result.metadata;
            body.insert("text".into(), result.text.into());
            body.insert("language".into(), result.language.into());
            body.insert("model".into(), result.model.into());
            HttpResponse::Ok().json(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::chunk::samples_to_base64;
    use crate::config::AppConfig;
    use crate::transcription::testing::fake_registry;
    use actix_web::body::MessageBody;
    use std::sync::Arc;

    async fn test_state(models: &[&str]) -> AppState {
        AppState::new(AppConfig::default(), Arc::new(fake_registry(models).await))
    }

    fn sample_source() -> AudioSource {
        AudioSource::RawSampleBase64(samples_to_base64(&[0.1f32, -0.1, 0.2]))
    }

    #[test]
    fn test_output_format_parsing_with_fallback() {
        assert_eq!(OutputFormat::parse(Some("text")), OutputFormat::Text);
        assert_eq!(
            OutputFormat::parse(Some("json_metadata")),
            OutputFormat::JsonMetadata
        );
        assert_eq!(OutputFormat::parse(Some("json")), OutputFormat::Json);
        assert_eq!(OutputFormat::parse(Some("yaml")), OutputFormat::Json);
        assert_eq!(OutputFormat::parse(None), OutputFormat::Json);
    }

    #[tokio::test]
    async fn test_unknown_model_is_not_found() {
        let state = test_state(&["base", "small"]).await;
        let err = run_transcription(&state, sample_source(), "large", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ModelNotFound(_)));
        assert_eq!(err.to_string(), "Model 'large' not loaded.");
    }

    #[tokio::test]
    async fn test_pipeline_produces_tagged_result() {
        let state = test_state(&["base"]).await;
        let result = run_transcription(&state, sample_source(), "base", Some("en".into()))
            .await
            .unwrap();
        assert_eq!(result.model, "base");
        assert_eq!(result.text, "text from base");
    }

    #[tokio::test]
    async fn test_undecodable_audio_is_a_decode_error() {
        let state = test_state(&["base"]).await;
        let err = run_transcription(
            &state,
            AudioSource::RawSampleBase64("&&&garbage&&&".into()),
            "base",
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn test_bad_audio_with_unknown_model_is_a_decode_error() {
        // Decoding runs before the registry lookup, so the decode failure
        // wins when both are wrong.
        let state = test_state(&["base"]).await;
        let err = run_transcription(
            &state,
            AudioSource::RawSampleBase64("&&&garbage&&&".into()),
            "large",
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    fn result_fixture() -> TranscriptionResult {
        let mut metadata = serde_json::Map::new();
        metadata.insert("duration".into(), 1.5.into());
        TranscriptionResult {
            text: "hello world".into(),
            language: "en".into(),
            metadata,
            model: "base".into(),
        }
    }

    #[test]
    fn test_text_format_is_plain_body() {
        let response = shape_response(result_fixture(), OutputFormat::Text);
        let body = response.into_body().try_into_bytes().unwrap();
        assert_eq!(&body[..], b"hello world");
    }

    #[test]
    fn test_json_format_is_minimal_shape() {
        let response = shape_response(result_fixture(), OutputFormat::Json);
        let body = response.into_body().try_into_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"text": "hello world", "language": "en", "model": "base"})
        );
    }

    #[test]
    fn test_json_metadata_format_lifts_metadata() {
        let response = shape_response(result_fixture(), OutputFormat::JsonMetadata);
        let body = response.into_body().try_into_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["text"], "hello world");
        assert_eq!(value["duration"], 1.5);
        assert_eq!(value["model"], "base");
    }
}
