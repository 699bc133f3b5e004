use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::api::current_user;
use crate::models::{
    CreateDeploymentRequest, DeploymentResponse, ListDeploymentsRequest, ModuleConfig, UpdateDeploymentRequest,
    UpdateRolesRequest,
};
use crate::services::auth_service::Claims;
use crate::services::deployment_service;
use crate::state::AppContext;
use crate::utils::error::AppResult;

#[utoipa::path(
    post,
    path = "/api/extensions/v1beta/deployment",
    tag = "Deployments",
    request_body = CreateDeploymentRequest,
    responses(
        (status = 201, description = "Deployment created"),
        (status = 400, description = "Invalid name"),
        (status = 403, description = "Only a super admin may create deployments")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_deployment(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    request: web::Json<CreateDeploymentRequest>,
) -> AppResult<HttpResponse> {
    log::info!("🏗️  POST /deployment - {}", request.name);

    let caller = current_user(&ctx, &claims).await?;
    let id = deployment_service::create_deployment(&ctx.db, &caller, &request).await?;
    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

#[utoipa::path(
    post,
    path = "/api/extensions/v1beta/deployment/search",
    tag = "Deployments",
    request_body = ListDeploymentsRequest,
    responses(
        (status = 200, description = "Deployments visible to the caller", body = Vec<DeploymentResponse>)
    ),
    security(("bearer_auth" = []))
)]
pub async fn search_deployments(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    request: web::Json<ListDeploymentsRequest>,
) -> AppResult<HttpResponse> {
    let caller = current_user(&ctx, &claims).await?;
    let deployments = deployment_service::list_deployments(&ctx.db, &caller, &request).await?;
    Ok(HttpResponse::Ok().json(json!({ "items": deployments, "total": deployments.len() })))
}

#[utoipa::path(
    get,
    path = "/api/extensions/v1beta/deployment/{deployment_id}",
    tag = "Deployments",
    params(("deployment_id" = String, Path, description = "Deployment id")),
    responses(
        (status = 200, description = "Deployment", body = DeploymentResponse),
        (status = 404, description = "Deployment not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn retrieve_deployment(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let caller = current_user(&ctx, &claims).await?;
    let deployment = deployment_service::retrieve_deployment(&ctx.db, &caller, &path).await?;
    Ok(HttpResponse::Ok().json(deployment))
}

#[utoipa::path(
    put,
    path = "/api/extensions/v1beta/deployment/{deployment_id}",
    tag = "Deployments",
    params(("deployment_id" = String, Path, description = "Deployment id")),
    request_body = UpdateDeploymentRequest,
    responses(
        (status = 200, description = "Deployment updated"),
        (status = 403, description = "Caller may not edit this deployment")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_deployment(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<UpdateDeploymentRequest>,
) -> AppResult<HttpResponse> {
    let caller = current_user(&ctx, &claims).await?;
    let id = deployment_service::update_deployment(&ctx.db, &caller, &path, &request).await?;
    Ok(HttpResponse::Ok().json(json!({ "id": id })))
}

#[utoipa::path(
    delete,
    path = "/api/extensions/v1beta/deployment/{deployment_id}",
    tag = "Deployments",
    params(("deployment_id" = String, Path, description = "Deployment id")),
    responses(
        (status = 204, description = "Deployment deleted"),
        (status = 403, description = "Only a super admin may delete deployments")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_deployment(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let caller = current_user(&ctx, &claims).await?;
    deployment_service::delete_deployment(&ctx.db, &caller, &path).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/extensions/v1beta/deployment/{deployment_id}/module-config",
    tag = "Deployments",
    params(("deployment_id" = String, Path, description = "Deployment id")),
    request_body = ModuleConfig,
    responses(
        (status = 201, description = "Module config created or replaced"),
        (status = 400, description = "configBody is not an object")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_or_update_module_config(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    config: web::Json<ModuleConfig>,
) -> AppResult<HttpResponse> {
    let deployment_id = path.into_inner();
    log::info!("🧩 POST /deployment/{}/module-config - {}", deployment_id, config.module_id);

    let caller = current_user(&ctx, &claims).await?;
    let id =
        deployment_service::create_or_update_module_config(&ctx.db, &caller, &deployment_id, config.into_inner())
            .await?;
    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

#[utoipa::path(
    delete,
    path = "/api/extensions/v1beta/deployment/{deployment_id}/module-config/{module_config_id}",
    tag = "Deployments",
    params(
        ("deployment_id" = String, Path, description = "Deployment id"),
        ("module_config_id" = String, Path, description = "Module config id")
    ),
    responses(
        (status = 204, description = "Module config removed"),
        (status = 404, description = "Module config not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_module_config(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<(String, String)>,
) -> AppResult<HttpResponse> {
    let (deployment_id, module_config_id) = path.into_inner();
    let caller = current_user(&ctx, &claims).await?;
    deployment_service::delete_module_config(&ctx.db, &caller, &deployment_id, &module_config_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    put,
    path = "/api/extensions/v1beta/deployment/{deployment_id}/role",
    tag = "Deployments",
    params(("deployment_id" = String, Path, description = "Deployment id")),
    request_body = UpdateRolesRequest,
    responses(
        (status = 200, description = "Ids of the stored custom roles"),
        (status = 400, description = "Duplicate role name or unknown role id")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_or_update_roles(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<UpdateRolesRequest>,
) -> AppResult<HttpResponse> {
    let deployment_id = path.into_inner();
    let caller = current_user(&ctx, &claims).await?;
    let ids = deployment_service::create_or_update_roles(&ctx.db, &caller, &deployment_id, request.into_inner().roles)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "ids": ids })))
}
