use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::api::current_user;
use crate::models::{
    ConfirmMessagesRequest, MessageResponse, MessageSummaryResponse, PolicyType, SearchMessagesRequest,
    SendMessageRequest, SendMessageToUserListRequest,
};
use crate::services::auth_service::Claims;
use crate::services::authorization_service::check_self_or_policy_by_id;
use crate::services::inbox_service;
use crate::state::AppContext;
use crate::utils::error::AppResult;

#[utoipa::path(
    post,
    path = "/api/inbox/v1beta/user/{user_id}/message/send",
    tag = "Inbox",
    params(("user_id" = String, Path, description = "Receiver id")),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message stored and receiver notified"),
        (status = 400, description = "Text is empty, too long or not allowed by the deployment"),
        (status = 403, description = "Caller may not message this user")
    ),
    security(("bearer_auth" = []))
)]
pub async fn send_message(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<SendMessageRequest>,
) -> AppResult<HttpResponse> {
    let receiver_id = path.into_inner();
    log::info!("✉️  POST /inbox/v1beta/user/{}/message/send - from {}", receiver_id, claims.sub);

    let sender = current_user(&ctx, &claims).await?;
    let id = inbox_service::send_message(&ctx, &sender, &receiver_id, &request).await?;
    Ok(HttpResponse::Created().json(json!({ "id": id })))
}

#[utoipa::path(
    post,
    path = "/api/inbox/v1beta/message/send",
    tag = "Inbox",
    request_body = SendMessageToUserListRequest,
    responses(
        (status = 201, description = "Number of messages sent"),
        (status = 403, description = "Caller may not message one of the users")
    ),
    security(("bearer_auth" = []))
)]
pub async fn send_message_to_user_list(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    request: web::Json<SendMessageToUserListRequest>,
) -> AppResult<HttpResponse> {
    log::info!(
        "📨 POST /inbox/v1beta/message/send - {} receivers from {}",
        request.user_ids.len(),
        claims.sub
    );

    let sender = current_user(&ctx, &claims).await?;
    let sent = inbox_service::send_message_to_user_list(&ctx, &sender, &request).await?;
    Ok(HttpResponse::Created().json(json!({ "sentMessages": sent })))
}

#[utoipa::path(
    post,
    path = "/api/inbox/v1beta/user/{user_id}/message/search",
    tag = "Inbox",
    params(("user_id" = String, Path, description = "Receiver id")),
    request_body = SearchMessagesRequest,
    responses(
        (status = 200, description = "Messages, newest first", body = Vec<MessageResponse>),
        (status = 403, description = "Caller may not read these messages")
    ),
    security(("bearer_auth" = []))
)]
pub async fn search_messages(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<SearchMessagesRequest>,
) -> AppResult<HttpResponse> {
    let caller = current_user(&ctx, &claims).await?;
    let messages = inbox_service::retrieve_messages(&ctx, &caller, &path, &request).await?;
    Ok(HttpResponse::Ok().json(json!({ "messages": messages })))
}

#[utoipa::path(
    post,
    path = "/api/inbox/v1beta/user/{user_id}/message/summary/search",
    tag = "Inbox",
    params(("user_id" = String, Path, description = "Receiver id")),
    responses(
        (status = 200, description = "Latest message and unread count per submitter", body = MessageSummaryResponse),
        (status = 403, description = "Caller may not read these messages")
    ),
    security(("bearer_auth" = []))
)]
pub async fn search_summary(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let caller = current_user(&ctx, &claims).await?;
    let messages = inbox_service::retrieve_submitters_first_messages(&ctx, &caller, &path).await?;
    Ok(HttpResponse::Ok().json(MessageSummaryResponse { messages }))
}

#[utoipa::path(
    post,
    path = "/api/inbox/v1beta/message/confirm",
    tag = "Inbox",
    request_body = ConfirmMessagesRequest,
    responses(
        (status = 201, description = "Number of messages marked as read"),
        (status = 403, description = "A message belongs to another user")
    ),
    security(("bearer_auth" = []))
)]
pub async fn confirm_messages(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    request: web::Json<ConfirmMessagesRequest>,
) -> AppResult<HttpResponse> {
    let caller = current_user(&ctx, &claims).await?;
    let updated = inbox_service::confirm_messages(&ctx, &caller, &request).await?;
    Ok(HttpResponse::Created().json(json!({ "updated": updated })))
}

#[utoipa::path(
    get,
    path = "/api/inbox/v1beta/user/{user_id}/message/unread",
    tag = "Inbox",
    params(("user_id" = String, Path, description = "Receiver id")),
    responses(
        (status = 200, description = "Number of unread messages"),
        (status = 403, description = "Caller may not read these messages")
    ),
    security(("bearer_auth" = []))
)]
pub async fn unread_count(
    ctx: web::Data<AppContext>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let caller = current_user(&ctx, &claims).await?;
    check_self_or_policy_by_id(&ctx.db, &caller, &path, PolicyType::ViewPatientMessage).await?;

    let count = inbox_service::retrieve_unread_count(&ctx.db, &path).await?;
    Ok(HttpResponse::Ok().json(json!({ "messages": count })))
}
