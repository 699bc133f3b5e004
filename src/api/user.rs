use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::api::current_user;
use crate::models::{AddRoleRequest, Role, UpdateProfileRequest, UserProfile};
use crate::services::auth_service::Claims;
use crate::services::authorization_service;
use crate::state::AppContext;
use crate::utils::error::AppResult;

#[utoipa::path(
    get,
    path = "/api/extensions/v1beta/user/{user_id}",
    tag = "Users",
    params(("user_id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "User profile", body = UserProfile),
        (status = 403, description = "Not the user and no access to the user's deployment"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn retrieve_profile(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let caller = current_user(&ctx, &claims).await?;
    let profile = authorization_service::retrieve_user_profile(&ctx.db, &caller, &path).await?;
    Ok(HttpResponse::Ok().json(profile))
}

#[utoipa::path(
    post,
    path = "/api/extensions/v1beta/user/{user_id}",
    tag = "Users",
    params(("user_id" = String, Path, description = "User id")),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated, returns the user id"),
        (status = 403, description = "Only the user may edit the profile")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_profile(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<UpdateProfileRequest>,
) -> AppResult<HttpResponse> {
    let caller = current_user(&ctx, &claims).await?;
    let id = authorization_service::update_user_profile(&ctx.db, &caller, &path, &request).await?;
    Ok(HttpResponse::Ok().json(json!({ "id": id })))
}

#[utoipa::path(
    post,
    path = "/api/extensions/v1beta/user/{user_id}/add-role",
    tag = "Users",
    params(("user_id" = String, Path, description = "User id")),
    request_body = AddRoleRequest,
    responses(
        (status = 200, description = "Role assigned, returns the user id"),
        (status = 400, description = "Role does not exist or resource is malformed"),
        (status = 403, description = "Caller may not assign roles on this resource")
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_role(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<AddRoleRequest>,
) -> AppResult<HttpResponse> {
    let caller = current_user(&ctx, &claims).await?;
    let id = authorization_service::add_role(&ctx.db, &caller, &path, &request).await?;
    Ok(HttpResponse::Ok().json(json!({ "id": id })))
}

#[utoipa::path(
    get,
    path = "/api/extensions/v1beta/roles",
    tag = "Users",
    responses(
        (status = 200, description = "Default roles", body = Vec<Role>)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_default_roles() -> HttpResponse {
    HttpResponse::Ok().json(authorization_service::list_default_roles())
}
