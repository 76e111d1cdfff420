//! # Transcription Module
//!
//! Speech-to-text inference using Whisper models via the Candle framework.
//! Pure Rust, no FFI bindings to whisper.cpp.
//!
//! ## Key Components:
//! - **Model**: the `SpeechModel` capability trait and its Candle-backed
//!   Whisper implementation
//! - **Engine**: per-model adapter that isolates inference failures and tags
//!   results with the serving model's name
//! - **Registry**: named model instances loaded once at startup
//!
//! The registry and engine only ever see `SpeechModel` trait objects; the
//! model's internals (weights, tokenizer, decoding loop) stay opaque to the
//! rest of the service.

pub mod engine;
pub mod model;
pub mod registry;

pub use engine::{TranscriptionEngine, TranscriptionResult};
pub use model::{ModelSize, SpeechModel, TranscriptionOutput};
pub use registry::ModelRegistry;

#[cfg(test)]
pub mod testing {
    //! Shared test doubles for the transcription stack.

    use super::model::{SpeechModel, TranscriptionOutput};
    use super::registry::ModelRegistry;
    use crate::config::ModelConfig;
    use anyhow::bail;
    use std::sync::Arc;

    /// A model capability that returns canned text or a synthetic failure.
    pub struct FakeModel {
        pub text: String,
        pub fail: bool,
    }

    impl FakeModel {
        pub fn speaking(text: &str) -> Self {
            Self {
                text: text.to_string(),
                fail: false,
            }
        }

        pub fn broken() -> Self {
            Self {
                text: String::new(),
                fail: true,
            }
        }
    }

    impl SpeechModel for FakeModel {
        fn transcribe(
            &self,
            samples: &[f32],
            language: Option<&str>,
        ) -> anyhow::Result<TranscriptionOutput> {
            if self.fail {
                bail!("synthetic inference failure");
            }
            let mut metadata = serde_json::Map::new();
            metadata.insert("samples".into(), samples.len().into());
            Ok(TranscriptionOutput {
                text: self.text.clone(),
                language: language.unwrap_or("en").to_string(),
                metadata,
            })
        }
    }

    /// Build a registry whose entries all resolve to a working fake model.
    pub async fn fake_registry(names: &[&str]) -> ModelRegistry {
        let entries: Vec<ModelConfig> = names
            .iter()
            .map(|n| ModelConfig {
                name: n.to_string(),
                device: "cpu".to_string(),
            })
            .collect();

        ModelRegistry::load_with(&entries, |cfg: ModelConfig| async move {
            Ok(Arc::new(FakeModel::speaking(&format!("text from {}", cfg.name)))
                as Arc<dyn SpeechModel>)
        })
        .await
    }
}
