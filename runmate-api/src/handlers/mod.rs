use axum::response::Json;

pub mod chats;
pub mod ratings;
pub mod run_events;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "runmate-api"
    }))
}
