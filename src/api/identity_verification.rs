use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;

use crate::api::current_user;
use crate::models::{RegisterApplicantRequest, VerificationCheck, VerificationLogResponse};
use crate::services::auth_service::Claims;
use crate::services::identity_verification_service;
use crate::state::AppContext;
use crate::utils::error::{AppError, AppResult};

pub const WEBHOOK_TOKEN_HEADER: &str = "X-Webhook-Token";

/// The callback is only accepted when a shared token is configured and matches.
pub fn check_webhook_token(expected: Option<&str>, provided: Option<&str>) -> AppResult<()> {
    match (expected, provided) {
        (Some(expected), Some(provided)) if expected == provided => Ok(()),
        (None, _) => {
            log::warn!("⚠️  Verification callback received but ONFIDO_WEBHOOK_TOKEN is not configured");
            Err(AppError::Unauthorized("Webhook token is not configured".to_string()))
        }
        _ => Err(AppError::Unauthorized("Invalid webhook token".to_string())),
    }
}

#[utoipa::path(
    post,
    path = "/api/extensions/v1/identity-verification/callback",
    tag = "Identity Verification",
    request_body = VerificationCheck,
    params(("X-Webhook-Token" = String, Header, description = "Shared webhook secret")),
    responses(
        (status = 200, description = "Check applied to the applicant's user"),
        (status = 401, description = "Webhook token missing or wrong"),
        (status = 404, description = "No user with this applicant id")
    )
)]
pub async fn verification_callback(
    ctx: web::Data<AppContext>,
    http_req: HttpRequest,
    check: web::Json<VerificationCheck>,
) -> AppResult<HttpResponse> {
    let provided = http_req
        .headers()
        .get(WEBHOOK_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    check_webhook_token(ctx.config.onfido_webhook_token.as_deref(), provided)?;

    log::info!("🪪 POST /identity-verification/callback - check {} ({})", check.id, check.status);
    let status = identity_verification_service::receive_verification_result(&ctx, &check).await?;
    Ok(HttpResponse::Ok().json(json!({ "verificationStatus": status })))
}

#[utoipa::path(
    post,
    path = "/api/extensions/v1/identity-verification/user/{user_id}/applicant",
    tag = "Identity Verification",
    params(("user_id" = String, Path, description = "User id")),
    request_body = RegisterApplicantRequest,
    responses(
        (status = 200, description = "Applicant stored, verification in process"),
        (status = 403, description = "Caller may not edit this user")
    ),
    security(("bearer_auth" = []))
)]
pub async fn register_applicant(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<RegisterApplicantRequest>,
) -> AppResult<HttpResponse> {
    let user_id = path.into_inner();
    let caller = current_user(&ctx, &claims).await?;
    identity_verification_service::register_applicant(&ctx.db, &caller, &user_id, &request).await?;
    Ok(HttpResponse::Ok().json(json!({ "id": user_id })))
}

#[utoipa::path(
    get,
    path = "/api/extensions/v1/identity-verification/user/{user_id}/verification-log",
    tag = "Identity Verification",
    params(("user_id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Latest verification log", body = VerificationLogResponse),
        (status = 404, description = "No verification log for the user")
    ),
    security(("bearer_auth" = []))
)]
pub async fn retrieve_verification_log(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let caller = current_user(&ctx, &claims).await?;
    let verification_log = identity_verification_service::retrieve_verification_log(&ctx.db, &caller, &path).await?;
    Ok(HttpResponse::Ok().json(verification_log))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_token_must_match() {
        assert!(check_webhook_token(Some("secret"), Some("secret")).is_ok());
        assert!(matches!(
            check_webhook_token(Some("secret"), Some("other")),
            Err(AppError::Unauthorized(_))
        ));
        assert!(check_webhook_token(Some("secret"), None).is_err());
    }

    #[test]
    fn test_webhook_rejected_when_not_configured() {
        assert!(check_webhook_token(None, Some("anything")).is_err());
    }
}
