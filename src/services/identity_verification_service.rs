use async_trait::async_trait;
use mongodb::bson::{doc, DateTime as BsonDateTime};

use crate::database::MongoDB;
use crate::events::{DeleteUserEvent, EventHandler, VerificationResultEvent};
use crate::models::{
    AuthorizedUser, CheckResult, CheckStatus, Deployment, PolicyType, PushMessage,
    RegisterApplicantRequest, User, VerificationCheck, VerificationLog, VerificationLogResponse,
    VerificationStatus, USERS_COLLECTION, VERIFICATION_LOGS_COLLECTION,
};
use crate::services::authorization_service::check_self_or_policy_by_id;
use crate::services::notification_service::push_for_user;
use crate::state::AppContext;
use crate::utils::error::{AppError, AppResult};
use crate::utils::validators::parse_object_id;

/// Maps a provider check onto the status stored on the user.
pub fn verification_status_for(status: Option<CheckStatus>, result: Option<CheckResult>) -> VerificationStatus {
    match (status, result) {
        (Some(CheckStatus::Complete), Some(CheckResult::Clear)) => VerificationStatus::IdVerificationSucceeded,
        (Some(CheckStatus::Complete), _) => VerificationStatus::IdVerificationFailed,
        _ => VerificationStatus::IdVerificationInProcess,
    }
}

/// Blocks users that have not passed identity verification from a
/// deployment that requires it.
pub fn check_onboarding(user: &User, deployment: &Deployment) -> AppResult<()> {
    if !deployment.features.identity_verification_required {
        return Ok(());
    }
    match user.verification_status {
        Some(VerificationStatus::IdVerificationSucceeded) => Ok(()),
        Some(VerificationStatus::IdVerificationInProcess) => Err(AppError::IdVerificationInProgress),
        Some(VerificationStatus::IdVerificationFailed) => Err(AppError::IdVerificationFailed),
        Some(VerificationStatus::IdVerificationNeeded) | None => Err(AppError::IdVerificationNeeded),
    }
}

async fn set_user_status(db: &MongoDB, user: &User, status: VerificationStatus) -> AppResult<()> {
    let oid = user
        .id
        .ok_or_else(|| AppError::Internal("Stored user without id".to_string()))?;
    db.collection::<User>(USERS_COLLECTION)
        .update_one(
            doc! { "_id": oid },
            doc! { "$set": {
                "verificationStatus": mongodb::bson::to_bson(&status)?,
                "updateDateTime": BsonDateTime::now(),
            } },
        )
        .await?;
    Ok(())
}

/// An applicant id belongs to at most one user.
fn check_applicant_owner(holder: Option<&User>, user_id: &str, applicant_id: &str) -> AppResult<()> {
    match holder {
        Some(other) if other.id_hex() != user_id => Err(AppError::invalid_request(format!(
            "Applicant {} is registered to another user",
            applicant_id
        ))),
        _ => Ok(()),
    }
}

pub async fn register_applicant(
    db: &MongoDB,
    caller: &AuthorizedUser,
    user_id: &str,
    request: &RegisterApplicantRequest,
) -> AppResult<()> {
    let applicant_id = request.applicant_id.trim();
    if applicant_id.is_empty() {
        return Err(AppError::invalid_request("applicantId is required"));
    }

    let user = check_self_or_policy_by_id(db, caller, user_id, PolicyType::EditPatientData).await?;
    let oid = parse_object_id(user_id, "userId")?;
    let users = db.collection::<User>(USERS_COLLECTION);
    let holder = users.find_one(doc! { "onfidoApplicantId": applicant_id }).await?;
    check_applicant_owner(holder.as_ref(), &user.id_hex(), applicant_id)?;
    let now = BsonDateTime::now();

    users
        .update_one(
            doc! { "_id": oid },
            doc! { "$set": {
                "onfidoApplicantId": applicant_id,
                "verificationStatus": mongodb::bson::to_bson(&VerificationStatus::IdVerificationInProcess)?,
                "updateDateTime": now,
            } },
        )
        .await?;

    db.collection::<VerificationLog>(VERIFICATION_LOGS_COLLECTION)
        .update_one(
            doc! { "userId": user.id_hex() },
            doc! {
                "$set": { "applicantId": applicant_id, "updateDateTime": now },
                "$setOnInsert": { "createDateTime": now, "documents": [] },
            },
        )
        .upsert(true)
        .await?;

    log::info!("🪪 Applicant {} registered for user {}", applicant_id, user_id);
    Ok(())
}

/// Applies a completed provider check to its user.
pub async fn receive_verification_result(ctx: &AppContext, check: &VerificationCheck) -> AppResult<VerificationStatus> {
    let user = ctx
        .db
        .collection::<User>(USERS_COLLECTION)
        .find_one(doc! { "onfidoApplicantId": &check.applicant_id })
        .await?
        .ok_or_else(|| AppError::not_found(format!("No user with applicant {}", check.applicant_id)))?;
    let user_id = user.id_hex();

    let check_status = check.check_status();
    let check_result = check.check_result();
    let status = verification_status_for(check_status, check_result);
    set_user_status(&ctx.db, &user, status).await?;

    let now = BsonDateTime::now();
    ctx.db
        .collection::<VerificationLog>(VERIFICATION_LOGS_COLLECTION)
        .update_one(
            doc! { "userId": &user_id },
            doc! {
                "$set": {
                    "applicantId": &check.applicant_id,
                    "checkId": &check.id,
                    "verificationStatus": mongodb::bson::to_bson(&check_status)?,
                    "verificationResult": mongodb::bson::to_bson(&check_result)?,
                    "documents": check.documents.clone(),
                    "updateDateTime": now,
                },
                "$setOnInsert": { "createDateTime": now },
            },
        )
        .upsert(true)
        .await?;

    if check_status == Some(CheckStatus::Complete) {
        let message = PushMessage::new(
            "Identity verification",
            "Your identity verification result is ready",
            PushMessage::VERIFICATION_RESULTS,
        )
        .with_data("status", status.as_str());
        push_for_user(&ctx.db, &ctx.push, &user_id, message, true).await?;
    }

    ctx.events
        .emit(
            &VerificationResultEvent {
                user_id: user_id.clone(),
                status,
                check_status,
                check_result,
            },
            false,
        )
        .await?;

    log::info!("🪪 Verification check {} for user {}: {:?}", check.id, user_id, status);
    Ok(status)
}

pub async fn retrieve_verification_log(
    db: &MongoDB,
    caller: &AuthorizedUser,
    user_id: &str,
) -> AppResult<VerificationLogResponse> {
    check_self_or_policy_by_id(db, caller, user_id, PolicyType::ViewPatientData).await?;

    db.collection::<VerificationLog>(VERIFICATION_LOGS_COLLECTION)
        .find_one(doc! { "userId": user_id })
        .await?
        .map(VerificationLogResponse::from)
        .ok_or_else(|| AppError::not_found(format!("No verification log for user {}", user_id)))
}

pub struct DeleteUserVerificationHandler {
    pub db: MongoDB,
}

#[async_trait]
impl EventHandler<DeleteUserEvent> for DeleteUserVerificationHandler {
    async fn handle(&self, event: &DeleteUserEvent) -> Result<(), AppError> {
        self.db
            .collection::<VerificationLog>(VERIFICATION_LOGS_COLLECTION)
            .delete_many(doc! { "userId": &event.user_id })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::deployment::test_deployment;
    use crate::models::user::test_user;

    #[test]
    fn test_status_from_check() {
        assert_eq!(
            verification_status_for(Some(CheckStatus::Complete), Some(CheckResult::Clear)),
            VerificationStatus::IdVerificationSucceeded
        );
        assert_eq!(
            verification_status_for(Some(CheckStatus::Complete), Some(CheckResult::Consider)),
            VerificationStatus::IdVerificationFailed
        );
        assert_eq!(
            verification_status_for(Some(CheckStatus::Complete), None),
            VerificationStatus::IdVerificationFailed
        );
        assert_eq!(
            verification_status_for(Some(CheckStatus::AwaitingApplicant), Some(CheckResult::Clear)),
            VerificationStatus::IdVerificationInProcess
        );
    }

    #[test]
    fn test_applicant_id_cannot_move_between_users() {
        let owner = test_user(vec![]);
        let other = test_user(vec![]);

        assert!(check_applicant_owner(None, &other.id_hex(), "app-1").is_ok());
        assert!(check_applicant_owner(Some(&owner), &owner.id_hex(), "app-1").is_ok());
        assert!(matches!(
            check_applicant_owner(Some(&owner), &other.id_hex(), "app-1"),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_onboarding_not_required() {
        let user = test_user(vec![]);
        assert!(check_onboarding(&user, &test_deployment()).is_ok());
    }

    #[test]
    fn test_onboarding_by_status() {
        let mut deployment = test_deployment();
        deployment.features.identity_verification_required = true;
        let mut user = test_user(vec![]);

        assert!(matches!(check_onboarding(&user, &deployment), Err(AppError::IdVerificationNeeded)));

        user.verification_status = Some(VerificationStatus::IdVerificationInProcess);
        assert!(matches!(check_onboarding(&user, &deployment), Err(AppError::IdVerificationInProgress)));

        user.verification_status = Some(VerificationStatus::IdVerificationFailed);
        assert!(matches!(check_onboarding(&user, &deployment), Err(AppError::IdVerificationFailed)));

        user.verification_status = Some(VerificationStatus::IdVerificationSucceeded);
        assert!(check_onboarding(&user, &deployment).is_ok());
    }
}
