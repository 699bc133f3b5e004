use actix_web::{web, HttpRequest, HttpResponse};

use crate::api::current_user;
use crate::models::{PolicyType, SessionResponse, UserProfile};
use crate::services::auth_service::{
    self, AuthResponse, Claims, RefreshTokenRequest, SignInRequest, SignOutRequest, SignUpRequest, SignUpResponse,
};
use crate::services::authorization_service::check_self_or_policy_by_id;
use crate::state::AppContext;
use crate::utils::error::{AppError, AppResult};

#[utoipa::path(
    post,
    path = "/api/auth/v1/signup",
    tag = "Auth",
    request_body = SignUpRequest,
    responses(
        (status = 201, description = "User created", body = SignUpResponse),
        (status = 400, description = "Invalid email or password, or user already exists")
    )
)]
pub async fn sign_up(ctx: web::Data<AppContext>, request: web::Json<SignUpRequest>) -> AppResult<HttpResponse> {
    log::info!("📝 POST /auth/v1/signup - email: {}", request.email);

    let uid = auth_service::sign_up(&ctx, &request).await?;

    log::info!("✅ Sign up successful: {}", request.email);
    Ok(HttpResponse::Created().json(SignUpResponse { uid }))
}

#[utoipa::path(
    post,
    path = "/api/auth/v1/signin",
    tag = "Auth",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Tokens issued", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn sign_in(
    ctx: web::Data<AppContext>,
    http_req: HttpRequest,
    request: web::Json<SignInRequest>,
) -> AppResult<HttpResponse> {
    log::info!("🔐 POST /auth/v1/signin - email: {}", request.email);

    let device_agent = http_req
        .headers()
        .get(actix_web::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    match auth_service::sign_in(&ctx, &request, device_agent).await {
        Ok(response) => {
            log::info!("✅ Sign in successful: {}", request.email);
            Ok(HttpResponse::Ok().json(response))
        }
        Err(e) => {
            log::warn!("❌ Sign in failed: {} - {}", request.email, e);
            Err(e)
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/v1/refreshtoken",
    tag = "Auth",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New access token, plus a rotated refresh token when close to expiry", body = AuthResponse),
        (status = 401, description = "Refresh token invalid, expired or signed out")
    )
)]
pub async fn refresh_token(
    ctx: web::Data<AppContext>,
    request: web::Json<RefreshTokenRequest>,
) -> AppResult<HttpResponse> {
    log::info!("🔄 POST /auth/v1/refreshtoken");

    let response = auth_service::refresh_token(&ctx, &request).await?;
    Ok(HttpResponse::Ok().json(response))
}

#[utoipa::path(
    post,
    path = "/api/auth/v1/signout",
    tag = "Auth",
    request_body = SignOutRequest,
    responses(
        (status = 204, description = "Session removed"),
        (status = 401, description = "Session already signed out")
    ),
    security(("bearer_auth" = []))
)]
pub async fn sign_out(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    request: web::Json<SignOutRequest>,
) -> AppResult<HttpResponse> {
    log::info!("👋 POST /auth/v1/signout - user: {}", claims.sub);

    auth_service::sign_out(&ctx, &claims.sub, &request.refresh_token).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/api/auth/v1/authprofile",
    tag = "Auth",
    responses(
        (status = 200, description = "Profile of the token owner", body = UserProfile),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = []))
)]
pub async fn auth_profile(ctx: web::Data<AppContext>, claims: web::ReqData<Claims>) -> AppResult<HttpResponse> {
    let profile = auth_service::auth_profile(&ctx.db, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(profile))
}

#[utoipa::path(
    get,
    path = "/api/auth/v1/user/{user_id}/sessions",
    tag = "Auth",
    params(("user_id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Live sessions, newest first", body = Vec<SessionResponse>),
        (status = 403, description = "Caller may not manage this user")
    ),
    security(("bearer_auth" = []))
)]
pub async fn retrieve_sessions(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let user_id = path.into_inner();
    let caller = current_user(&ctx, &claims).await?;
    check_self_or_policy_by_id(&ctx.db, &caller, &user_id, PolicyType::EditPatientData).await?;

    let sessions = auth_service::retrieve_sessions(&ctx.db, &user_id).await?;
    Ok(HttpResponse::Ok().json(sessions))
}

#[utoipa::path(
    delete,
    path = "/api/auth/v1/user/{user_id}",
    tag = "Auth",
    params(("user_id" = String, Path, description = "User id")),
    responses(
        (status = 204, description = "User and all related data removed"),
        (status = 403, description = "Only a super admin may delete users")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let user_id = path.into_inner();
    let caller = current_user(&ctx, &claims).await?;
    if !caller.is_super_admin() {
        return Err(AppError::permission_denied());
    }

    log::info!("🗑️  DELETE /auth/v1/user/{} - by {}", user_id, claims.sub);
    auth_service::delete_user(&ctx, &user_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
