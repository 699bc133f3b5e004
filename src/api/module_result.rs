use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::api::current_user;
use crate::models::{ModuleResultResponse, RetrieveModuleResultsQuery, SubmitModuleResultRequest};
use crate::services::auth_service::Claims;
use crate::services::module_result_service;
use crate::state::AppContext;
use crate::utils::error::AppResult;

#[utoipa::path(
    post,
    path = "/api/extensions/v1beta/user/{user_id}/module-result/{module_id}",
    tag = "Module Results",
    params(
        ("user_id" = String, Path, description = "Patient id"),
        ("module_id" = String, Path, description = "Module id, e.g. KCCQ or GAD7")
    ),
    request_body = SubmitModuleResultRequest,
    responses(
        (status = 201, description = "Result scored and stored"),
        (status = 400, description = "Answers invalid, incomplete, or identity verification pending"),
        (status = 404, description = "Deployment or module config not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn submit_module_result(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<(String, String)>,
    request: web::Json<SubmitModuleResultRequest>,
) -> AppResult<HttpResponse> {
    let (user_id, module_id) = path.into_inner();
    log::info!(
        "📋 POST /module-result/{} - user {} ({} answers)",
        module_id,
        user_id,
        request.answers.len()
    );

    let caller = current_user(&ctx, &claims).await?;
    let id = module_result_service::submit(&ctx, &caller, &user_id, &module_id, request.into_inner()).await?;
    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

#[utoipa::path(
    get,
    path = "/api/extensions/v1beta/user/{user_id}/module-result/{module_id}",
    tag = "Module Results",
    params(
        ("user_id" = String, Path, description = "Patient id"),
        ("module_id" = String, Path, description = "Module id"),
        ("skip" = Option<u64>, Query, description = "Results to skip"),
        ("limit" = Option<i64>, Query, description = "Page size, 1..=100")
    ),
    responses(
        (status = 200, description = "Results, newest first", body = Vec<ModuleResultResponse>),
        (status = 403, description = "Caller may not view this patient")
    ),
    security(("bearer_auth" = []))
)]
pub async fn retrieve_module_results(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<(String, String)>,
    query: web::Query<RetrieveModuleResultsQuery>,
) -> AppResult<HttpResponse> {
    let (user_id, module_id) = path.into_inner();
    let caller = current_user(&ctx, &claims).await?;
    let results = module_result_service::retrieve(&ctx.db, &caller, &user_id, &module_id, &query).await?;
    Ok(HttpResponse::Ok().json(results))
}
