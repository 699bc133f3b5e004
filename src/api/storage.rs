use actix_web::{http::header, web, HttpRequest, HttpResponse};

use crate::api::current_user;
use crate::models::{SignedUrlResponse, UploadQuery, UploadResponse};
use crate::services::auth_service::Claims;
use crate::services::storage_service::{self, StoredObject};
use crate::state::AppContext;
use crate::utils::error::AppResult;

fn request_content_type(http_req: &HttpRequest) -> Option<&str> {
    http_req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

fn object_response(object: StoredObject) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(object.content_type)
        .body(object.data)
}

/// RFC 6266 attachment header; the name is percent-encoded so any UTF-8 file name survives.
pub fn content_disposition(file_name: &str) -> String {
    format!("attachment; filename*=UTF-8''{}", urlencoding::encode(file_name))
}

// ==================== v1beta: bucket objects ====================

#[utoipa::path(
    post,
    path = "/api/storage/v1beta/upload/{bucket}",
    tag = "Storage",
    params(
        ("bucket" = String, Path, description = "Target bucket"),
        ("filename" = String, Query, description = "Object key")
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Object stored"),
        (status = 400, description = "Bucket not allowed, bad file name or file too large")
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_to_bucket(
    ctx: web::Data<AppContext>,
    http_req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<UploadQuery>,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    let bucket = path.into_inner();
    log::info!("📤 POST /storage/v1beta/upload/{} - {} ({} bytes)", bucket, query.filename, body.len());

    storage_service::upload_to_bucket(&ctx, &bucket, &query.filename, &body, request_content_type(&http_req)).await?;
    Ok(HttpResponse::Created().finish())
}

#[utoipa::path(
    get,
    path = "/api/storage/v1beta/download/{bucket}/{filename}",
    tag = "Storage",
    params(
        ("bucket" = String, Path, description = "Bucket"),
        ("filename" = String, Path, description = "Object key, may contain slashes")
    ),
    responses(
        (status = 200, description = "Object bytes", content_type = "application/octet-stream"),
        (status = 404, description = "Object does not exist")
    ),
    security(("bearer_auth" = []))
)]
pub async fn download_from_bucket(
    ctx: web::Data<AppContext>,
    path: web::Path<(String, String)>,
) -> AppResult<HttpResponse> {
    let (bucket, filename) = path.into_inner();
    let object = storage_service::download_from_bucket(&ctx, &bucket, &filename).await?;
    Ok(object_response(object))
}

#[utoipa::path(
    get,
    path = "/api/storage/v1beta/signed/url/{bucket}/{filename}",
    tag = "Storage",
    params(
        ("bucket" = String, Path, description = "Bucket"),
        ("filename" = String, Path, description = "Object key, may contain slashes")
    ),
    responses(
        (status = 200, description = "Signed download URL", body = SignedUrlResponse),
        (status = 404, description = "Object does not exist")
    ),
    security(("bearer_auth" = []))
)]
pub async fn signed_url_for_bucket(
    ctx: web::Data<AppContext>,
    path: web::Path<(String, String)>,
) -> AppResult<HttpResponse> {
    let (bucket, filename) = path.into_inner();
    let response = storage_service::signed_url_for_bucket(&ctx, &bucket, &filename).await?;
    Ok(HttpResponse::Ok().json(response))
}

// ==================== v1: user files ====================

#[utoipa::path(
    post,
    path = "/api/storage/v1/upload",
    tag = "Storage",
    params(("filename" = String, Query, description = "Original file name")),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "File stored", body = UploadResponse),
        (status = 400, description = "Missing file name or file too large")
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_file(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    http_req: HttpRequest,
    query: web::Query<UploadQuery>,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    log::info!("📤 POST /storage/v1/upload - {} by {}", query.filename, claims.sub);

    let id = storage_service::upload_file(&ctx, &claims.sub, &query.filename, &body, request_content_type(&http_req))
        .await?;
    Ok(HttpResponse::Created().json(UploadResponse { id }))
}

#[utoipa::path(
    get,
    path = "/api/storage/v1/download/{file_id}",
    tag = "Storage",
    params(("file_id" = String, Path, description = "File id")),
    responses(
        (status = 200, description = "File bytes", content_type = "application/octet-stream"),
        (status = 403, description = "File belongs to a user the caller may not view"),
        (status = 404, description = "File does not exist")
    ),
    security(("bearer_auth" = []))
)]
pub async fn download_file(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let caller = current_user(&ctx, &claims).await?;
    let (record, object) = storage_service::download_file(&ctx, &caller, &path).await?;

    let mut response = object_response(object);
    if let Ok(value) = header::HeaderValue::from_str(&content_disposition(&record.file_name)) {
        response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

#[utoipa::path(
    get,
    path = "/api/storage/v1/signed/url/{file_id}",
    tag = "Storage",
    params(("file_id" = String, Path, description = "File id")),
    responses(
        (status = 200, description = "Signed URL with file metadata", body = SignedUrlResponse),
        (status = 403, description = "File belongs to a user the caller may not view"),
        (status = 404, description = "File does not exist")
    ),
    security(("bearer_auth" = []))
)]
pub async fn retrieve_signed_url(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let caller = current_user(&ctx, &claims).await?;
    let response = storage_service::retrieve_signed_url(&ctx, &caller, &path).await?;
    Ok(HttpResponse::Ok().json(response))
}

#[utoipa::path(
    get,
    path = "/api/storage/v1/signed/{token}",
    tag = "Storage",
    params(("token" = String, Path, description = "Signed token from a signed URL")),
    responses(
        (status = 200, description = "Object bytes", content_type = "application/octet-stream"),
        (status = 401, description = "Token tampered with or expired")
    )
)]
pub async fn download_signed(ctx: web::Data<AppContext>, path: web::Path<String>) -> AppResult<HttpResponse> {
    match storage_service::download_signed(&ctx, &path).await {
        Ok(object) => Ok(object_response(object)),
        Err(e) => {
            log::warn!("⚠️  Signed download rejected: {}", e);
            Err(e)
        }
    }
}

/// Limit for raw upload bodies.
pub fn payload_config(max_file_size: usize) -> web::PayloadConfig {
    web::PayloadConfig::new(max_file_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_encodes_name() {
        assert_eq!(content_disposition("scan.png"), "attachment; filename*=UTF-8''scan.png");
        assert_eq!(
            content_disposition("relatório final.pdf"),
            "attachment; filename*=UTF-8''relat%C3%B3rio%20final.pdf"
        );
    }
}
