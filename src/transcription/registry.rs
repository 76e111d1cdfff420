//! # Model Registry
//!
//! Loads the configured model instances at startup and serves name lookups
//! afterwards. Loading is the only phase that can fail, and it fails *per
//! entry*: a model that cannot be loaded is logged and skipped, never taking
//! the whole service down or surfacing to a caller. After construction the
//! registry is immutable, so `get` and `list` are plain lock-free reads that
//! any number of requests can perform concurrently.
//!
//! There is no ambient global here: `main` builds the registry once and hands
//! an `Arc` to everything that needs lookups.

use crate::config::ModelConfig;
use crate::device::DevicePreference;
use crate::transcription::engine::TranscriptionEngine;
use crate::transcription::model::{ModelSize, SpeechModel, WhisperModel};
use anyhow::anyhow;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

/// Immutable mapping from configured model names to ready engines.
pub struct ModelRegistry {
    engines: HashMap<String, TranscriptionEngine>,
}

impl ModelRegistry {
    /// Load every configured model with the Whisper backend.
    ///
    /// Startup-only; there is no hot reload. Entries that fail to load are
    /// reported at `error` level and simply absent from `get`/`list`.
    pub async fn load(entries: &[ModelConfig]) -> Self {
        Self::load_with(entries, |cfg: ModelConfig| async move {
            let size: ModelSize = cfg.name.parse()?;
            let preference: DevicePreference =
                cfg.device.parse().map_err(|e: String| anyhow!(e))?;
            let model = WhisperModel::load(size, preference.resolve()).await?;
            Ok(Arc::new(model) as Arc<dyn SpeechModel>)
        })
        .await
    }

    /// Load entries with a caller-supplied model loader.
    ///
    /// This is the seam that keeps registry semantics testable without
    /// touching the network: production code goes through [`Self::load`],
    /// tests inject stub capabilities.
    pub async fn load_with<L, Fut>(entries: &[ModelConfig], loader: L) -> Self
    where
        L: Fn(ModelConfig) -> Fut,
        Fut: Future<Output = anyhow::Result<Arc<dyn SpeechModel>>>,
    {
        let mut engines = HashMap::new();

        for entry in entries {
            match loader(entry.clone()).await {
                Ok(model) => {
                    info!("Loaded model: {} on {}", entry.name, entry.device);
                    engines.insert(
                        entry.name.clone(),
                        TranscriptionEngine::new(entry.name.clone(), model),
                    );
                }
                Err(err) => {
                    // Contained here: the entry is skipped and the service
                    // keeps serving whatever did load.
                    error!(
                        "Failed to load model {} on {}: {}",
                        entry.name, entry.device, err
                    );
                }
            }
        }

        Self { engines }
    }

    /// Look up an engine by model name.
    pub fn get(&self, name: &str) -> Option<TranscriptionEngine> {
        self.engines.get(name).cloned()
    }

    /// Names of all successfully loaded models, sorted for stable output.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::testing::{fake_registry, FakeModel};
    use anyhow::bail;

    fn entry(name: &str) -> ModelConfig {
        ModelConfig {
            name: name.to_string(),
            device: "cpu".to_string(),
        }
    }

    #[tokio::test]
    async fn test_get_and_list() {
        let registry = fake_registry(&["base", "small"]).await;

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.list(), vec!["base".to_string(), "small".to_string()]);
        assert!(registry.get("base").is_some());
        assert!(registry.get("large").is_none());
    }

    #[tokio::test]
    async fn test_load_failure_is_skipped_not_fatal() {
        let entries = [entry("good"), entry("bad")];

        let registry = ModelRegistry::load_with(&entries, |cfg: ModelConfig| async move {
            if cfg.name == "bad" {
                bail!("weights missing");
            }
            Ok(Arc::new(FakeModel::speaking("ok")) as Arc<dyn SpeechModel>)
        })
        .await;

        assert_eq!(registry.list(), vec!["good".to_string()]);
        assert!(registry.get("bad").is_none());
    }

    #[tokio::test]
    async fn test_all_failures_yield_empty_registry() {
        let entries = [entry("a"), entry("b")];

        let registry = ModelRegistry::load_with(&entries, |_cfg: ModelConfig| async move {
            bail!("nothing loads today")
        })
        .await;

        assert!(registry.is_empty());
        assert!(registry.list().is_empty());
    }

    #[tokio::test]
    async fn test_loaded_engine_serves_requests() {
        let registry = fake_registry(&["base"]).await;
        let engine = registry.get("base").unwrap();

        let result = engine
            .transcribe(crate::audio::CanonicalAudio::new(vec![0.0; 32]), None)
            .await
            .unwrap();
        assert_eq!(result.model, "base");
        assert_eq!(result.text, "text from base");
    }
}
