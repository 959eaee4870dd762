use std::sync::Arc;
use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::AppState;

pub mod files;
pub mod users;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.client_url);

    Router::new()
        .route("/api/health", get(health_check))
        .nest("/api/users", users::routes())
        .nest("/api/files", files::routes(&state.config))
        .fallback(not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(client_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600));

    match client_url.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            tracing::warn!("Ignoring invalid CLIENT_URL {:?}: {}", client_url, e);
            cors
        }
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "message": "Excel Analytics API is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "message": "Route not found" })))
}


#[cfg(test)]
mod tests {
    use super::test_support::TestApp;
    use super::*;

    #[tokio::test]
    async fn health_check_reports_ok() {
        let app = TestApp::new();
        let (status, body) = app.get("/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "OK");
    }

    #[tokio::test]
    async fn unknown_routes_return_json_404() {
        let app = TestApp::new();
        let (status, body) = app.get("/api/nowhere", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Route not found");
    }
}
