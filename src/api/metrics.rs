use actix_web::HttpResponse;
use std::sync::atomic::{AtomicU64, Ordering};

static REQUEST_COUNT: AtomicU64 = AtomicU64::new(0);
static ERROR_COUNT: AtomicU64 = AtomicU64::new(0);

pub fn increment_request_count() {
    REQUEST_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub fn increment_error_count() {
    ERROR_COUNT.fetch_add(1, Ordering::Relaxed);
}

/// Prometheus text exposition of the request and error counters.
pub fn render(requests: u64, errors: u64) -> String {
    format!(
        "# HELP phoenix_http_requests_total Total number of HTTP requests\n\
         # TYPE phoenix_http_requests_total counter\n\
         phoenix_http_requests_total {}\n\
         \n\
         # HELP phoenix_http_errors_total Total number of HTTP error responses\n\
         # TYPE phoenix_http_errors_total counter\n\
         phoenix_http_errors_total {}\n",
        requests, errors
    )
}

#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Health",
    responses(
        (status = 200, description = "Request and error counters in Prometheus text format", content_type = "text/plain")
    )
)]
pub async fn get_metrics() -> HttpResponse {
    let body = render(
        REQUEST_COUNT.load(Ordering::Relaxed),
        ERROR_COUNT.load(Ordering::Relaxed),
    );

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_both_counters() {
        let text = render(12, 3);
        assert!(text.contains("phoenix_http_requests_total 12\n"));
        assert!(text.contains("phoenix_http_errors_total 3\n"));
        assert!(text.contains("# TYPE phoenix_http_errors_total counter"));
    }
}
