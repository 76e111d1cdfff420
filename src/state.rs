//! # Application State Management
//!
//! Shared state handed to every HTTP request handler and WebSocket session.
//!
//! The interesting property is what is *not* here: there is no mutable model
//! state and no ambient global. Configuration is read once at startup and the
//! model registry is immutable after construction, so the whole state clones
//! cheaply and requests never contend on a lock. The only mutable piece is an
//! atomic session counter used by the health endpoint.

use crate::config::AppConfig;
use crate::transcription::ModelRegistry;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Configuration, frozen at startup
    pub config: AppConfig,

    /// The model registry, built once in `main` and injected here;
    /// lock-free reads from any number of concurrent requests
    pub registry: Arc<ModelRegistry>,

    /// When the server started (for uptime reporting)
    pub start_time: Instant,

    /// Number of currently open streaming sessions
    active_sessions: Arc<AtomicU32>,
}

impl AppState {
    pub fn new(config: AppConfig, registry: Arc<ModelRegistry>) -> Self {
        Self {
            config,
            registry,
            start_time: Instant::now(),
            active_sessions: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn session_opened(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn active_sessions(&self) -> u32 {
        self.active_sessions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::testing::fake_registry;

    #[tokio::test]
    async fn test_session_counter() {
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(fake_registry(&["base"]).await),
        );

        assert_eq!(state.active_sessions(), 0);
        state.session_opened();
        state.session_opened();
        assert_eq!(state.active_sessions(), 2);
        state.session_closed();
        assert_eq!(state.active_sessions(), 1);
    }
}
