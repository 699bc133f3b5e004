use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, DateTime as BsonDateTime};

use crate::database::MongoDB;
use crate::events::{EventHandler, InboxAction, InboxAuthEvent, StorageAuthEvent};
use crate::models::{
    default_role, AddRoleRequest, AuthorizedUser, Deployment, Grant, Organization, PolicyType, Role,
    RoleAssignment, UpdateProfileRequest, User, UserProfile, DEFAULT_ROLES, DEPLOYMENTS_COLLECTION,
    ORGANIZATIONS_COLLECTION, USERS_COLLECTION,
};
use crate::services::auth_service::get_user;
use crate::utils::error::{AppError, AppResult};
use crate::utils::validators::parse_object_id;

async fn find_deployment(db: &MongoDB, deployment_id: &str) -> AppResult<Option<Deployment>> {
    let Ok(oid) = parse_object_id(deployment_id, "deploymentId") else {
        return Ok(None);
    };
    Ok(db
        .collection::<Deployment>(DEPLOYMENTS_COLLECTION)
        .find_one(doc! { "_id": oid })
        .await?)
}

async fn find_organization(db: &MongoDB, organization_id: &str) -> AppResult<Option<Organization>> {
    let Ok(oid) = parse_object_id(organization_id, "organizationId") else {
        return Ok(None);
    };
    Ok(db
        .collection::<Organization>(ORGANIZATIONS_COLLECTION)
        .find_one(doc! { "_id": oid })
        .await?)
}

/// Looks a role up among the defaults, then among the resource's custom roles.
pub async fn resolve_role(db: &MongoDB, assignment: &RoleAssignment) -> AppResult<Option<Role>> {
    if let Some(role) = default_role(&assignment.role_id) {
        return Ok(Some(role.clone()));
    }

    let custom_roles = if let Some(deployment_id) = assignment.deployment_id() {
        find_deployment(db, deployment_id).await?.map(|d| d.roles)
    } else if let Some(organization_id) = assignment.organization_id() {
        find_organization(db, organization_id).await?.map(|o| o.roles)
    } else {
        None
    };

    Ok(custom_roles.and_then(|roles| {
        roles
            .into_iter()
            .find(|r| r.id.as_deref() == Some(assignment.role_id.as_str()))
    }))
}

pub async fn build_authorized_user(db: &MongoDB, user: User) -> AppResult<AuthorizedUser> {
    let mut grants = Vec::with_capacity(user.roles.len());

    for assignment in &user.roles {
        let Some(role) = resolve_role(db, assignment).await? else {
            log::warn!(
                "⚠️  Role {} on {} no longer exists for user {}",
                assignment.role_id,
                assignment.resource,
                user.id_hex()
            );
            continue;
        };

        // Organization roles also apply to every linked deployment
        if let Some(organization_id) = assignment.organization_id() {
            if let Some(organization) = find_organization(db, organization_id).await? {
                for deployment_id in &organization.deployment_ids {
                    grants.push(Grant {
                        resource: format!("deployment/{}", deployment_id),
                        role: role.clone(),
                    });
                }
            }
        }

        grants.push(Grant {
            resource: assignment.resource.clone(),
            role,
        });
    }

    Ok(AuthorizedUser::new(user, grants))
}

pub async fn load_authorized_user(db: &MongoDB, user_id: &str) -> AppResult<AuthorizedUser> {
    let user = get_user(db, user_id).await?;
    build_authorized_user(db, user).await
}

/// A user whose data is being accessed, with every deployment they are
/// enrolled in, organization links included.
#[derive(Debug, Clone)]
pub struct TargetUser {
    pub user: User,
    pub deployment_ids: Vec<String>,
}

impl TargetUser {
    pub async fn resolve(db: &MongoDB, user: User) -> AppResult<Self> {
        let deployment_ids = user_deployment_ids(db, &user).await?;
        Ok(Self { user, deployment_ids })
    }

    pub async fn load(db: &MongoDB, user_id: &str) -> AppResult<Self> {
        let user = get_user(db, user_id).await?;
        Self::resolve(db, user).await
    }
}

/// Self access, or `policy` on one of the target's deployments.
pub fn check_self_or_policy(caller: &AuthorizedUser, target: &TargetUser, policy: PolicyType) -> AppResult<()> {
    if caller.id() == target.user.id_hex() {
        return Ok(());
    }
    if caller.has_policy_in_any_deployment(&target.deployment_ids, policy) {
        return Ok(());
    }
    Err(AppError::permission_denied())
}

pub async fn check_self_or_policy_by_id(
    db: &MongoDB,
    caller: &AuthorizedUser,
    target_user_id: &str,
    policy: PolicyType,
) -> AppResult<User> {
    let target = TargetUser::load(db, target_user_id).await?;
    check_self_or_policy(caller, &target, policy)?;
    Ok(target.user)
}

pub async fn retrieve_user_profile(db: &MongoDB, caller: &AuthorizedUser, user_id: &str) -> AppResult<UserProfile> {
    let target = check_self_or_policy_by_id(db, caller, user_id, PolicyType::ViewPatientData).await?;
    Ok(UserProfile::from(target))
}

pub async fn update_user_profile(
    db: &MongoDB,
    caller: &AuthorizedUser,
    user_id: &str,
    request: &UpdateProfileRequest,
) -> AppResult<String> {
    if caller.id() != user_id {
        return Err(AppError::permission_denied());
    }

    let mut set = doc! { "updateDateTime": BsonDateTime::now() };
    if let Some(display_name) = &request.display_name {
        set.insert("displayName", display_name.trim());
    }
    if let Some(language) = &request.language {
        set.insert("language", language.trim());
    }
    if let Some(phone_number) = &request.phone_number {
        set.insert("phoneNumber", phone_number.trim());
    }

    let oid = parse_object_id(user_id, "userId")?;
    db.collection::<User>(USERS_COLLECTION)
        .update_one(doc! { "_id": oid }, doc! { "$set": set })
        .await?;

    Ok(user_id.to_string())
}

pub async fn add_role(
    db: &MongoDB,
    caller: &AuthorizedUser,
    user_id: &str,
    request: &AddRoleRequest,
) -> AppResult<String> {
    let assignment = RoleAssignment::new(&request.role_id, &request.resource);
    assignment.validate()?;

    if !caller.has_policy_for(&assignment.resource, PolicyType::AssignRolesToStaff) {
        return Err(AppError::permission_denied());
    }

    if resolve_role(db, &assignment).await?.is_none() {
        return Err(AppError::RoleDoesNotExist);
    }

    let oid = parse_object_id(user_id, "userId")?;
    let result = db
        .collection::<User>(USERS_COLLECTION)
        .update_one(
            doc! { "_id": oid },
            doc! {
                "$addToSet": { "roles": mongodb::bson::to_bson(&assignment)? },
                "$set": { "updateDateTime": BsonDateTime::now() },
            },
        )
        .await?;

    if result.matched_count == 0 {
        return Err(AppError::not_found(format!("User {} does not exist", user_id)));
    }

    log::info!(
        "👤 Role {} on {} granted to {} by {}",
        assignment.role_id,
        assignment.resource,
        user_id,
        caller.id()
    );
    Ok(user_id.to_string())
}

pub fn list_default_roles() -> Vec<Role> {
    let mut roles: Vec<Role> = DEFAULT_ROLES.values().cloned().collect();
    roles.sort_by(|a, b| a.name.cmp(&b.name));
    roles
}

/// Every deployment the target user is enrolled in, organization links included.
pub async fn user_deployment_ids(db: &MongoDB, user: &User) -> AppResult<Vec<String>> {
    let mut ids = user.deployment_ids();

    let organization_ids: Vec<mongodb::bson::oid::ObjectId> = user
        .roles
        .iter()
        .filter_map(|r| r.organization_id())
        .filter_map(|id| parse_object_id(id, "organizationId").ok())
        .collect();

    if !organization_ids.is_empty() {
        let organizations: Vec<Organization> = db
            .collection::<Organization>(ORGANIZATIONS_COLLECTION)
            .find(doc! { "_id": { "$in": organization_ids } })
            .await?
            .try_collect()
            .await?;
        ids.extend(organizations.into_iter().flat_map(|o| o.deployment_ids));
    }

    ids.sort();
    ids.dedup();
    Ok(ids)
}

/// Access rules for the inbox component.
pub struct InboxAuthHandler {
    pub db: MongoDB,
}

impl InboxAuthHandler {
    fn check(caller: &AuthorizedUser, action: InboxAction, target: Option<&TargetUser>) -> AppResult<()> {
        match action {
            InboxAction::SendMessage => {
                let target = target.ok_or_else(|| AppError::invalid_request("Receiver is required"))?;
                if caller.has_policy_in_any_deployment(&target.deployment_ids, PolicyType::SendPatientMessage) {
                    Ok(())
                } else {
                    Err(AppError::permission_denied())
                }
            }
            InboxAction::SendMessageToUserList => {
                if caller.has_policy_anywhere(PolicyType::SendPatientMessage) {
                    Ok(())
                } else {
                    Err(AppError::permission_denied())
                }
            }
            InboxAction::SearchMessages | InboxAction::SummaryMessages => {
                let target = target.ok_or_else(|| AppError::invalid_request("User is required"))?;
                check_self_or_policy(caller, target, PolicyType::ViewPatientMessage)
            }
            InboxAction::ConfirmMessages => {
                if caller.is_user() {
                    Ok(())
                } else {
                    Err(AppError::permission_denied())
                }
            }
        }
    }
}

#[async_trait]
impl EventHandler<InboxAuthEvent> for InboxAuthHandler {
    async fn handle(&self, event: &InboxAuthEvent) -> Result<(), AppError> {
        let target = match &event.target_user_id {
            Some(user_id) => Some(TargetUser::load(&self.db, user_id).await?),
            None => None,
        };
        Self::check(&event.caller, event.action, target.as_ref())
    }
}

/// Reading somebody else's file needs VIEW_PATIENT_DATA on their deployment.
pub struct StorageAuthHandler {
    pub db: MongoDB,
}

#[async_trait]
impl EventHandler<StorageAuthEvent> for StorageAuthHandler {
    async fn handle(&self, event: &StorageAuthEvent) -> Result<(), AppError> {
        if event.caller.id() == event.owner_id {
            return Ok(());
        }
        let owner = TargetUser::load(&self.db, &event.owner_id).await?;
        check_self_or_policy(&event.caller, &owner, PolicyType::ViewPatientData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::test_user;
    use crate::models::RoleName;

    fn caller_with(resource: &str, role_id: &str) -> AuthorizedUser {
        AuthorizedUser::new(
            test_user(vec![]),
            vec![Grant {
                resource: resource.to_string(),
                role: default_role(role_id).unwrap().clone(),
            }],
        )
    }

    fn target(user: User) -> TargetUser {
        TargetUser {
            deployment_ids: user.deployment_ids(),
            user,
        }
    }

    fn patient_in(deployment_id: &str) -> TargetUser {
        target(test_user(vec![RoleAssignment::for_deployment(RoleName::USER, deployment_id)]))
    }

    #[test]
    fn test_send_requires_policy_on_receiver_deployment() {
        let staff = caller_with("deployment/d1", RoleName::CONTRIBUTOR);

        assert!(InboxAuthHandler::check(&staff, InboxAction::SendMessage, Some(&patient_in("d1"))).is_ok());
        assert!(matches!(
            InboxAuthHandler::check(&staff, InboxAction::SendMessage, Some(&patient_in("d2"))),
            Err(AppError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_call_center_cannot_send() {
        let staff = caller_with("deployment/d1", RoleName::CALL_CENTER);
        assert!(InboxAuthHandler::check(&staff, InboxAction::SendMessage, Some(&patient_in("d1"))).is_err());
        assert!(InboxAuthHandler::check(&staff, InboxAction::SendMessageToUserList, None).is_err());
    }

    #[test]
    fn test_search_allows_self() {
        let patient = patient_in("d1");
        let caller = AuthorizedUser::new(patient.user.clone(), vec![]);
        assert!(InboxAuthHandler::check(&caller, InboxAction::SearchMessages, Some(&patient)).is_ok());

        let stranger = caller_with("deployment/d9", RoleName::USER);
        assert!(InboxAuthHandler::check(&stranger, InboxAction::SummaryMessages, Some(&patient)).is_err());
    }

    #[test]
    fn test_organization_linked_deployments_count_for_access() {
        let staff = caller_with("deployment/d1", RoleName::CONTRIBUTOR);
        let mut member = target(test_user(vec![]));
        assert!(InboxAuthHandler::check(&staff, InboxAction::SendMessage, Some(&member)).is_err());

        member.deployment_ids = vec!["d1".to_string()];
        assert!(InboxAuthHandler::check(&staff, InboxAction::SendMessage, Some(&member)).is_ok());
        assert!(check_self_or_policy(&staff, &member, PolicyType::ViewPatientData).is_ok());
    }

    #[test]
    fn test_super_admin_reads_unenrolled_user() {
        let admin = caller_with("*", RoleName::SUPER_ADMIN);
        let unenrolled = target(test_user(vec![]));

        assert!(check_self_or_policy(&admin, &unenrolled, PolicyType::ViewPatientData).is_ok());
        assert!(InboxAuthHandler::check(&admin, InboxAction::SearchMessages, Some(&unenrolled)).is_ok());
    }

    #[test]
    fn test_confirm_is_for_users_only() {
        let patient = caller_with("deployment/d1", RoleName::USER);
        let staff = caller_with("deployment/d1", RoleName::ADMIN);

        assert!(InboxAuthHandler::check(&patient, InboxAction::ConfirmMessages, None).is_ok());
        assert!(InboxAuthHandler::check(&staff, InboxAction::ConfirmMessages, None).is_err());
    }

    #[test]
    fn test_default_roles_listing_is_sorted() {
        let roles = list_default_roles();
        assert_eq!(roles.len(), DEFAULT_ROLES.len());
        assert!(roles.windows(2).all(|w| w[0].name <= w[1].name));
    }
}
