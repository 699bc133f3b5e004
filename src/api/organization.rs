use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::api::current_user;
use crate::models::{
    CreateOrganizationRequest, LinkDeploymentRequest, ListOrganizationsRequest, OrganizationResponse,
    UpdateOrganizationRequest, UpdateRolesRequest,
};
use crate::services::auth_service::Claims;
use crate::services::organization_service;
use crate::state::AppContext;
use crate::utils::error::AppResult;

#[utoipa::path(
    post,
    path = "/api/extensions/v1beta/organization",
    tag = "Organizations",
    request_body = CreateOrganizationRequest,
    responses(
        (status = 201, description = "Organization created"),
        (status = 403, description = "Caller may not create organizations")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_organization(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    request: web::Json<CreateOrganizationRequest>,
) -> AppResult<HttpResponse> {
    log::info!("🏢 POST /organization - {}", request.name);

    let caller = current_user(&ctx, &claims).await?;
    let id = organization_service::create_organization(&ctx.db, &caller, &request).await?;
    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

#[utoipa::path(
    post,
    path = "/api/extensions/v1beta/organization/search",
    tag = "Organizations",
    request_body = ListOrganizationsRequest,
    responses(
        (status = 200, description = "Organizations visible to the caller", body = Vec<OrganizationResponse>)
    ),
    security(("bearer_auth" = []))
)]
pub async fn search_organizations(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    request: web::Json<ListOrganizationsRequest>,
) -> AppResult<HttpResponse> {
    let caller = current_user(&ctx, &claims).await?;
    let organizations =
        organization_service::list_organizations(&ctx.db, &caller, request.skip, request.limit).await?;
    Ok(HttpResponse::Ok().json(json!({ "items": organizations, "total": organizations.len() })))
}

#[utoipa::path(
    get,
    path = "/api/extensions/v1beta/organization/{organization_id}",
    tag = "Organizations",
    params(("organization_id" = String, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Organization", body = OrganizationResponse),
        (status = 404, description = "Organization not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn retrieve_organization(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let caller = current_user(&ctx, &claims).await?;
    let organization = organization_service::retrieve_organization(&ctx.db, &caller, &path).await?;
    Ok(HttpResponse::Ok().json(organization))
}

#[utoipa::path(
    put,
    path = "/api/extensions/v1beta/organization/{organization_id}",
    tag = "Organizations",
    params(("organization_id" = String, Path, description = "Organization id")),
    request_body = UpdateOrganizationRequest,
    responses(
        (status = 200, description = "Organization updated"),
        (status = 403, description = "Caller may not edit this organization")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_organization(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<UpdateOrganizationRequest>,
) -> AppResult<HttpResponse> {
    let caller = current_user(&ctx, &claims).await?;
    let id = organization_service::update_organization(&ctx.db, &caller, &path, &request).await?;
    Ok(HttpResponse::Ok().json(json!({ "id": id })))
}

#[utoipa::path(
    delete,
    path = "/api/extensions/v1beta/organization/{organization_id}",
    tag = "Organizations",
    params(("organization_id" = String, Path, description = "Organization id")),
    responses(
        (status = 204, description = "Organization deleted"),
        (status = 403, description = "Caller may not delete this organization")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_organization(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let caller = current_user(&ctx, &claims).await?;
    organization_service::delete_organization(&ctx.db, &caller, &path).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/extensions/v1beta/organization/{organization_id}/link-deployment",
    tag = "Organizations",
    params(("organization_id" = String, Path, description = "Organization id")),
    request_body = LinkDeploymentRequest,
    responses(
        (status = 200, description = "Deployment linked"),
        (status = 404, description = "Organization or deployment not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn link_deployment(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<LinkDeploymentRequest>,
) -> AppResult<HttpResponse> {
    let organization_id = path.into_inner();
    let caller = current_user(&ctx, &claims).await?;
    organization_service::link_deployment(&ctx.db, &caller, &organization_id, &request).await?;
    Ok(HttpResponse::Ok().json(json!({ "id": organization_id })))
}

#[utoipa::path(
    delete,
    path = "/api/extensions/v1beta/organization/{organization_id}/deployment/{deployment_id}",
    tag = "Organizations",
    params(
        ("organization_id" = String, Path, description = "Organization id"),
        ("deployment_id" = String, Path, description = "Deployment id")
    ),
    responses(
        (status = 204, description = "Deployment unlinked"),
        (status = 404, description = "Deployment is not linked to the organization")
    ),
    security(("bearer_auth" = []))
)]
pub async fn unlink_deployment(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<(String, String)>,
) -> AppResult<HttpResponse> {
    let (organization_id, deployment_id) = path.into_inner();
    let caller = current_user(&ctx, &claims).await?;
    organization_service::unlink_deployment(&ctx.db, &caller, &organization_id, &deployment_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    put,
    path = "/api/extensions/v1beta/organization/{organization_id}/role",
    tag = "Organizations",
    params(("organization_id" = String, Path, description = "Organization id")),
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
    let organization_id = path.into_inner();
    let caller = current_user(&ctx, &claims).await?;
    let ids =
        organization_service::create_or_update_roles(&ctx.db, &caller, &organization_id, request.into_inner().roles)
            .await?;
    Ok(HttpResponse::Ok().json(json!({ "ids": ids })))
}
