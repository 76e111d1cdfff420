//! # Streaming Transcription Protocol
//!
//! Handles the persistent WebSocket endpoint (`/transcribe/stream`) where a
//! client sends audio chunk messages and receives one transcription response
//! per chunk over the same connection.
//!
//! ## Wire Protocol:
//! - **Client → Server** (JSON text frames):
//!   `{"model": "...", "language": "...", "audio_ndarray": "<base64 f32>"}`
//! - **Server → Client** on success:
//!   `{"text": "...", "is_final": true, "metadata": {...}, "model": "..."}`
//! - **Server → Client** on per-message failure: `{"error": "..."}`
//!
//! ## Session State Machine:
//! Open → receive message → dispatch (decode + infer) → respond → Open,
//! until the connection closes. Per-message failures (unknown model, bad
//! payload, inference error) produce an `{error}` frame and the session stays
//! Open; only a connection close or a transport-level protocol error is
//! terminal.
//!
//! Each session is its own actor, so sessions run concurrently with each
//! other; *within* a session, `ctx.wait` suspends the mailbox until the
//! current chunk's response is sent, which makes processing strictly
//! sequential and caps in-flight work at one chunk per session. There is
//! deliberately no inference timeout and no chunk-count limit.

use crate::audio::decode::decode_raw_samples;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::transcription::ModelRegistry;
use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One inbound chunk message.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamRequest {
    /// Model name to transcribe this chunk with
    pub model: String,

    /// Optional language hint
    pub language: Option<String>,

    /// Base64-wrapped raw f32 samples (16 kHz mono)
    pub audio_ndarray: String,
}

/// One outbound success response.
#[derive(Debug, Serialize)]
pub struct StreamResponse {
    pub text: String,

    /// Always true: each chunk is transcribed as an independent complete
    /// unit, never incrementally refined.
    pub is_final: bool,

    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Name of the model that actually served this chunk
    pub model: String,
}

/// Process one chunk message against the registry.
///
/// This is the whole per-message pipeline of the session protocol, kept free
/// of actor plumbing so it can be exercised directly in tests: resolve the
/// model, decode the payload, run inference, shape the response. Every
/// failure maps to a per-message error for the caller to frame.
pub(crate) async fn dispatch_chunk(
    registry: &ModelRegistry,
    request: StreamRequest,
) -> ApiResult<StreamResponse> {
    let engine = registry
        .get(&request.model)
        .ok_or_else(|| ApiError::ModelNotFound(request.model.clone()))?;

    let audio = decode_raw_samples(&request.audio_ndarray)?;
    let result = engine.transcribe(audio, request.language).await?;

    // The metadata field carries the complete result: backend extras plus
    // text and language, so clients can read everything from either place.
    let mut metadata = result.metadata;
    metadata.insert("text".into(), result.text.clone().into());
    metadata.insert("language".into(), result.language.into());

    Ok(StreamResponse {
        text: result.text,
        is_final: true,
        metadata,
        model: result.model,
    })
}

/// Serialize a per-message error frame.
fn error_frame(message: &str) -> String {
    json!({ "error": message }).to_string()
}

/// Actor owning one streaming session.
pub struct StreamSession {
    /// Session id, for log correlation only
    id: Uuid,

    registry: Arc<ModelRegistry>,
    state: AppState,

    /// Model name from the most recent message
    current_model: Option<String>,

    /// Language hint from the most recent message
    current_language: Option<String>,

    /// Number of messages processed on this session
    sequence: u64,
}

impl StreamSession {
    pub fn new(state: AppState) -> Self {
        Self {
            id: Uuid::new_v4(),
            registry: Arc::clone(&state.registry),
            state,
            current_model: None,
            current_language: None,
            sequence: 0,
        }
    }

    /// Handle one inbound text frame: parse, then dispatch with the mailbox
    /// suspended until the response goes out.
    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let request = match serde_json::from_str::<StreamRequest>(text) {
            Ok(request) => request,
            Err(err) => {
                // Malformed frame: answer and stay open.
                ctx.text(error_frame(&format!("Invalid message: {}", err)));
                return;
            }
        };

        self.current_model = Some(request.model.clone());
        self.current_language = request.language.clone();

        let registry = Arc::clone(&self.registry);
        let session_id = self.id;

        let fut = async move { dispatch_chunk(&registry, request).await }
            .into_actor(self)
            .map(move |outcome, act, ctx| {
                act.sequence += 1;
                match outcome {
                    Ok(response) => {
                        debug!(
                            session = %session_id,
                            seq = act.sequence,
                            model = %response.model,
                            "Chunk transcribed"
                        );
                        match serde_json::to_string(&response) {
                            Ok(payload) => ctx.text(payload),
                            Err(err) => {
                                ctx.text(error_frame(&format!(
                                    "response serialization failed: {}",
                                    err
                                )));
                            }
                        }
                    }
                    Err(err) => {
                        warn!(session = %session_id, seq = act.sequence, error = %err,
                            "Chunk failed, session stays open");
                        ctx.text(error_frame(&err.to_string()));
                    }
                }
            });

        // Strictly sequential: no further mailbox messages (including the
        // next chunk) are processed until this response has been sent.
        ctx.wait(fut);
    }
}

impl Actor for StreamSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        self.state.session_opened();
        info!(session = %self.id, "Streaming session opened");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.state.session_closed();
        info!(
            session = %self.id,
            chunks = self.sequence,
            last_model = self.current_model.as_deref().unwrap_or("-"),
            "Streaming session closed"
        );
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for StreamSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.handle_text(&text, ctx),
            Ok(ws::Message::Binary(_)) => {
                // The message schema carries samples base64-wrapped in JSON.
                ctx.text(error_frame(
                    "binary frames are not supported; send JSON with audio_ndarray",
                ));
            }
            Ok(ws::Message::Ping(data)) => ctx.pong(&data),
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                debug!(session = %self.id, ?reason, "Client closed session");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                ctx.text(error_frame("fragmented frames are not supported"));
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(session = %self.id, error = %err, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// `GET /transcribe/stream`: upgrade to a streaming session.
pub async fn transcribe_stream(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let session = StreamSession::new(state.get_ref().clone());
    info!(session = %session.id, peer = ?req.connection_info().peer_addr(),
        "New streaming connection");
    ws::start(session, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::chunk::samples_to_base64;
    use crate::transcription::testing::fake_registry;

    fn chunk_request(model: &str, samples: &[f32]) -> StreamRequest {
        StreamRequest {
            model: model.to_string(),
            language: None,
            audio_ndarray: samples_to_base64(samples),
        }
    }

    #[test]
    fn test_inbound_message_parsing() {
        let request: StreamRequest = serde_json::from_str(
            r#"{"model": "base", "language": "en", "audio_ndarray": "AAAAAA=="}"#,
        )
        .unwrap();
        assert_eq!(request.model, "base");
        assert_eq!(request.language.as_deref(), Some("en"));

        // Language is optional.
        let request: StreamRequest =
            serde_json::from_str(r#"{"model": "base", "audio_ndarray": "AAAAAA=="}"#).unwrap();
        assert!(request.language.is_none());
    }

    #[tokio::test]
    async fn test_successful_chunk_is_marked_final() {
        let registry = fake_registry(&["base"]).await;
        let response = dispatch_chunk(&registry, chunk_request("base", &[0.1, 0.2]))
            .await
            .unwrap();

        assert!(response.is_final);
        assert_eq!(response.model, "base");
        assert_eq!(response.text, "text from base");

        let wire: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&response).unwrap()).unwrap();
        assert_eq!(wire["is_final"], true);
        assert_eq!(wire["model"], "base");
    }

    #[tokio::test]
    async fn test_unknown_model_fails_only_this_message() {
        let registry = fake_registry(&["base", "small"]).await;

        let err = dispatch_chunk(&registry, chunk_request("large", &[0.0]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Model 'large' not loaded.");

        // The registry (and thus the session) is still fully usable.
        let response = dispatch_chunk(&registry, chunk_request("small", &[0.0]))
            .await
            .unwrap();
        assert_eq!(response.model, "small");
    }

    #[tokio::test]
    async fn test_bad_payload_then_valid_messages() {
        let registry = fake_registry(&["base"]).await;

        let bad = StreamRequest {
            model: "base".into(),
            language: None,
            audio_ndarray: "***not base64***".into(),
        };
        let err = dispatch_chunk(&registry, bad).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));

        // Subsequent messages are unaffected.
        let response = dispatch_chunk(&registry, chunk_request("base", &[0.5]))
            .await
            .unwrap();
        assert!(response.is_final);
    }

    #[tokio::test]
    async fn test_metadata_carries_full_result() {
        let registry = fake_registry(&["base"]).await;
        let response = dispatch_chunk(&registry, chunk_request("base", &[0.0; 4]))
            .await
            .unwrap();

        // Backend extras and the standard fields both live in metadata.
        assert_eq!(response.metadata["samples"], 4);
        assert_eq!(response.metadata["text"], "text from base");
        assert_eq!(response.metadata["language"], "en");
    }

    #[tokio::test]
    async fn test_three_chunks_in_order() {
        let registry = fake_registry(&["base"]).await;
        let mut responses = Vec::new();

        for i in 0..3 {
            let samples = vec![i as f32; 8];
            responses.push(
                dispatch_chunk(&registry, chunk_request("base", &samples))
                    .await
                    .unwrap(),
            );
        }

        assert_eq!(responses.len(), 3);
        for response in &responses {
            assert!(response.is_final);
            assert_eq!(response.model, "base");
        }
    }

    #[test]
    fn test_error_frame_shape() {
        let frame = error_frame("Model 'large' not loaded.");
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["error"], "Model 'large' not loaded.");
    }
}
