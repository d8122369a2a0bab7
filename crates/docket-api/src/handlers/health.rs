use axum::{http::StatusCode, response::IntoResponse, Json};

/// Liveness check
#[utoipa::path(
    get,
    path = "/api/v1/extkafka/test",
    tag = "health",
    responses((status = 200, description = "Gateway is running"))
)]
pub async fn liveness() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "alive" })),
    )
}
