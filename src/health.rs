//! Liveness probe. Deliberately trivial: if this answers, the process is up
//! and the registry finished construction.

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.uptime_seconds(),
        "loaded_models": state.registry.len(),
        "active_sessions": state.active_sessions(),
    }))
}
