//! Model listing endpoint: the names of every successfully loaded model, as
//! a bare JSON array. Models that failed to load at startup simply do not
//! appear here.

use crate::state::AppState;
use actix_web::{web, HttpResponse};

pub async fn list_models(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.registry.list())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::transcription::testing::fake_registry;
    use actix_web::body::MessageBody;
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_lists_loaded_model_names() {
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(fake_registry(&["small", "base"]).await),
        );

        let response = list_models(web::Data::new(state)).await;
        let body = response.into_body().try_into_bytes().unwrap();
        let names: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(names, vec!["base".to_string(), "small".to_string()]);
    }
}
