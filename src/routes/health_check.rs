use actix_web::web;
use actix_web::HttpResponse;
use serde_json::json;
use sqlx::PgPool;

/// `GET /health` — a `200` confirms the process can reach its database.
pub async fn health_check(pool: web::Data<PgPool>) -> HttpResponse {
    match sqlx::query_scalar!("SELECT 1").fetch_one(pool.get_ref()).await {
        Ok(_) => HttpResponse::Ok().json(json!({ "status": "ok" })),
        Err(e) => {
            tracing::error!(error.cause_chain = ?e, error.message = %e, "health check failed");
            HttpResponse::ServiceUnavailable().json(json!({ "status": "unavailable" }))
        }
    }
}
