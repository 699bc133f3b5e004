pub mod auth;
pub mod deployment;
pub mod health;
pub mod identity_verification;
pub mod inbox;
pub mod metrics;
pub mod module_result;
pub mod notification;
pub mod organization;
pub mod storage;
pub mod swagger;
pub mod user;

use actix_web::web;

use crate::models::AuthorizedUser;
use crate::services::auth_service::Claims;
use crate::services::authorization_service::load_authorized_user;
use crate::state::AppContext;
use crate::utils::error::AppResult;

/// Resolves the authenticated caller with all role assignments expanded.
pub async fn current_user(ctx: &web::Data<AppContext>, claims: &web::ReqData<Claims>) -> AppResult<AuthorizedUser> {
    load_authorized_user(&ctx.db, &claims.sub).await
}
