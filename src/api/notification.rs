use actix_web::{web, HttpResponse};

use crate::models::{DeviceResponse, RegisterDeviceRequest, UnregisterDeviceRequest};
use crate::services::auth_service::Claims;
use crate::services::notification_service;
use crate::state::AppContext;
use crate::utils::error::AppResult;

#[utoipa::path(
    post,
    path = "/api/notification/v1beta/device/register",
    tag = "Notifications",
    request_body = RegisterDeviceRequest,
    responses(
        (status = 201, description = "Device registered for the caller")
    ),
    security(("bearer_auth" = []))
)]
pub async fn register_device(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    request: web::Json<RegisterDeviceRequest>,
) -> AppResult<HttpResponse> {
    log::info!("📱 POST /notification/v1beta/device/register - user {}", claims.sub);

    notification_service::register_device(&ctx.db, &claims.sub, &request).await?;
    Ok(HttpResponse::Created().finish())
}

#[utoipa::path(
    delete,
    path = "/api/notification/v1beta/device/unregister",
    tag = "Notifications",
    request_body = UnregisterDeviceRequest,
    responses(
        (status = 204, description = "Device removed"),
        (status = 404, description = "Device not registered for the caller")
    ),
    security(("bearer_auth" = []))
)]
pub async fn unregister_device(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    request: web::Json<UnregisterDeviceRequest>,
) -> AppResult<HttpResponse> {
    notification_service::unregister_device(&ctx.db, &claims.sub, &request.device_push_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/api/notification/v1beta/device",
    tag = "Notifications",
    responses(
        (status = 200, description = "Devices registered for the caller", body = Vec<DeviceResponse>)
    ),
    security(("bearer_auth" = []))
)]
pub async fn retrieve_devices(ctx: web::Data<AppContext>, claims: web::ReqData<Claims>) -> AppResult<HttpResponse> {
    let devices = notification_service::retrieve_devices(&ctx.db, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(devices))
}
