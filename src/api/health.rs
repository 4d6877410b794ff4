use actix_web::{HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use super::Store;

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub database: String,
    pub timestamp: i64,
}

pub async fn index() -> impl Responder {
    HttpResponse::Ok().body("API WORKING")
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn health_check(store: Store) -> impl Responder {
    let (status, database) = match store.ping().await {
        Ok(()) => ("healthy", "connected".to_string()),
        Err(e) => {
            log::error!("❌ Health check: database ping failed: {}", e);
            ("unhealthy", "unreachable".to_string())
        }
    };

    let body = HealthResponse {
        status: status.to_string(),
        service: "clinic-booking-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
        timestamp: chrono::Utc::now().timestamp(),
    };

    if status == "healthy" {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::TestState;
    use actix_web::{test, web, App};

    #[actix_rt::test]
    async fn test_index_and_health() {
        let state = TestState::new();
        let app = test::init_service(
            App::new()
                .app_data(state.store_data.clone())
                .route("/", web::get().to(index))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let body = test::call_and_read_body(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(body, "API WORKING");

        let health: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["database"], "connected");
    }
}
