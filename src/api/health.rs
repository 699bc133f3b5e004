use actix_web::{HttpResponse, Responder};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: i64,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        HealthResponse {
            status: "healthy".to_string(),
            service: "phoenix-platform".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App};

    #[actix_web::test]
    async fn test_health_reports_service_name() {
        let app = test::init_service(App::new().route("/health", web::get().to(health_check))).await;

        let body: HealthResponse =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/health").to_request()).await;

        assert_eq!(body.status, "healthy");
        assert_eq!(body.service, "phoenix-platform");
    }
}
