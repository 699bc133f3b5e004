use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};

use crate::database::MongoDB;
use crate::models::{
    AuthorizedUser, CreateOrganizationRequest, LinkDeploymentRequest, Organization,
    OrganizationResponse, PolicyType, Role, UpdateOrganizationRequest, ORGANIZATIONS_COLLECTION,
};
use crate::services::deployment_service::{get_deployment, merge_custom_roles};
use crate::utils::error::{AppError, AppResult};
use crate::utils::validators::{clamp_limit, clamp_skip, parse_object_id, validate_entity_name};

pub const MAX_ORGANIZATION_NAME_LENGTH: usize = 80;

fn require_policy(caller: &AuthorizedUser, organization_id: &str, policy: PolicyType) -> AppResult<()> {
    if caller.has_policy_for(&format!("organization/{}", organization_id), policy) {
        Ok(())
    } else {
        Err(AppError::permission_denied())
    }
}

pub async fn get_organization(db: &MongoDB, organization_id: &str) -> AppResult<Organization> {
    let oid = parse_object_id(organization_id, "organizationId")?;
    db.collection::<Organization>(ORGANIZATIONS_COLLECTION)
        .find_one(doc! { "_id": oid })
        .await?
        .ok_or_else(|| AppError::not_found(format!("Organization {} does not exist", organization_id)))
}

pub async fn create_organization(
    db: &MongoDB,
    caller: &AuthorizedUser,
    request: &CreateOrganizationRequest,
) -> AppResult<String> {
    if !caller.has_policy_anywhere(PolicyType::CreateOrganization) {
        return Err(AppError::permission_denied());
    }

    let now = BsonDateTime::now();
    let organization = Organization {
        id: None,
        name: validate_entity_name(&request.name, MAX_ORGANIZATION_NAME_LENGTH)?,
        status: request.status.unwrap_or_default(),
        deployment_ids: vec![],
        roles: vec![],
        create_date_time: now,
        update_date_time: now,
    };

    let inserted = db
        .collection::<Organization>(ORGANIZATIONS_COLLECTION)
        .insert_one(&organization)
        .await?;
    let organization_id = inserted
        .inserted_id
        .as_object_id()
        .map(|id| id.to_hex())
        .ok_or_else(|| AppError::Internal("Organization inserted without ObjectId".to_string()))?;

    log::info!("🏢 Organization {} created by {}", organization_id, caller.id());
    Ok(organization_id)
}

pub async fn retrieve_organization(
    db: &MongoDB,
    caller: &AuthorizedUser,
    organization_id: &str,
) -> AppResult<OrganizationResponse> {
    require_policy(caller, organization_id, PolicyType::ViewOrganization)?;
    Ok(get_organization(db, organization_id).await?.into())
}

/// Super admins see every organization, others only the ones they were granted.
pub async fn list_organizations(
    db: &MongoDB,
    caller: &AuthorizedUser,
    skip: Option<u64>,
    limit: Option<i64>,
) -> AppResult<Vec<OrganizationResponse>> {
    let filter = if caller.is_super_admin() {
        doc! {}
    } else {
        let ids: Vec<ObjectId> = caller
            .grants
            .iter()
            .filter_map(|g| g.resource.strip_prefix("organization/"))
            .filter_map(|id| ObjectId::parse_str(id).ok())
            .collect();
        doc! { "_id": { "$in": ids } }
    };

    let organizations: Vec<Organization> = db
        .collection::<Organization>(ORGANIZATIONS_COLLECTION)
        .find(filter)
        .sort(doc! { "createDateTime": -1 })
        .skip(clamp_skip(skip))
        .limit(clamp_limit(limit))
        .await?
        .try_collect()
        .await?;

    Ok(organizations.into_iter().map(OrganizationResponse::from).collect())
}

pub async fn update_organization(
    db: &MongoDB,
    caller: &AuthorizedUser,
    organization_id: &str,
    request: &UpdateOrganizationRequest,
) -> AppResult<String> {
    require_policy(caller, organization_id, PolicyType::EditOrganization)?;
    let oid = parse_object_id(organization_id, "organizationId")?;

    let mut set = doc! { "updateDateTime": BsonDateTime::now() };
    if let Some(name) = &request.name {
        set.insert("name", validate_entity_name(name, MAX_ORGANIZATION_NAME_LENGTH)?);
    }
    if let Some(status) = &request.status {
        set.insert("status", mongodb::bson::to_bson(status)?);
    }

    let result = db
        .collection::<Organization>(ORGANIZATIONS_COLLECTION)
        .update_one(doc! { "_id": oid }, doc! { "$set": set })
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::not_found(format!("Organization {} does not exist", organization_id)));
    }
    Ok(organization_id.to_string())
}

pub async fn delete_organization(db: &MongoDB, caller: &AuthorizedUser, organization_id: &str) -> AppResult<()> {
    require_policy(caller, organization_id, PolicyType::DeleteOrganization)?;
    let oid = parse_object_id(organization_id, "organizationId")?;

    let result = db
        .collection::<Organization>(ORGANIZATIONS_COLLECTION)
        .delete_one(doc! { "_id": oid })
        .await?;
    if result.deleted_count == 0 {
        return Err(AppError::not_found(format!("Organization {} does not exist", organization_id)));
    }

    log::info!("🗑️  Organization {} deleted by {}", organization_id, caller.id());
    Ok(())
}

pub async fn link_deployment(
    db: &MongoDB,
    caller: &AuthorizedUser,
    organization_id: &str,
    request: &LinkDeploymentRequest,
) -> AppResult<()> {
    require_policy(caller, organization_id, PolicyType::EditOrganization)?;
    get_deployment(db, &request.deployment_id).await?;
    let oid = parse_object_id(organization_id, "organizationId")?;

    let result = db
        .collection::<Organization>(ORGANIZATIONS_COLLECTION)
        .update_one(
            doc! { "_id": oid },
            doc! {
                "$addToSet": { "deploymentIds": &request.deployment_id },
                "$set": { "updateDateTime": BsonDateTime::now() },
            },
        )
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::not_found(format!("Organization {} does not exist", organization_id)));
    }

    log::info!("🔗 Deployment {} linked to organization {}", request.deployment_id, organization_id);
    Ok(())
}

pub async fn unlink_deployment(
    db: &MongoDB,
    caller: &AuthorizedUser,
    organization_id: &str,
    deployment_id: &str,
) -> AppResult<()> {
    require_policy(caller, organization_id, PolicyType::EditOrganization)?;
    let oid = parse_object_id(organization_id, "organizationId")?;

    let result = db
        .collection::<Organization>(ORGANIZATIONS_COLLECTION)
        .update_one(
            doc! { "_id": oid, "deploymentIds": deployment_id },
            doc! {
                "$pull": { "deploymentIds": deployment_id },
                "$set": { "updateDateTime": BsonDateTime::now() },
            },
        )
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::not_found(format!(
            "Deployment {} is not linked to organization {}",
            deployment_id, organization_id
        )));
    }
    Ok(())
}

pub async fn create_or_update_roles(
    db: &MongoDB,
    caller: &AuthorizedUser,
    organization_id: &str,
    roles: Vec<Role>,
) -> AppResult<Vec<String>> {
    require_policy(caller, organization_id, PolicyType::EditOrganization)?;
    let organization = get_organization(db, organization_id).await?;
    let merged = merge_custom_roles(&organization.roles, roles)?;
    let oid = parse_object_id(organization_id, "organizationId")?;

    db.collection::<Organization>(ORGANIZATIONS_COLLECTION)
        .update_one(
            doc! { "_id": oid },
            doc! { "$set": {
                "roles": mongodb::bson::to_bson(&merged)?,
                "updateDateTime": BsonDateTime::now(),
            } },
        )
        .await?;

    Ok(merged.into_iter().filter_map(|r| r.id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::default_role;
    use crate::models::user::test_user;
    use crate::models::{Grant, RoleName};

    fn caller(resource: &str, role_id: &str) -> AuthorizedUser {
        AuthorizedUser::new(
            test_user(vec![]),
            vec![Grant {
                resource: resource.to_string(),
                role: default_role(role_id).unwrap().clone(),
            }],
        )
    }

    #[test]
    fn test_owner_manages_own_organization_only() {
        let owner = caller("organization/o1", RoleName::ORGANIZATION_OWNER);

        assert!(require_policy(&owner, "o1", PolicyType::EditOrganization).is_ok());
        assert!(require_policy(&owner, "o1", PolicyType::ViewOrganization).is_ok());
        assert!(require_policy(&owner, "o2", PolicyType::EditOrganization).is_err());
        assert!(require_policy(&owner, "o1", PolicyType::DeleteOrganization).is_err());
    }

    #[test]
    fn test_super_admin_passes_every_check() {
        let admin = caller("*", RoleName::SUPER_ADMIN);
        assert!(require_policy(&admin, "anything", PolicyType::DeleteOrganization).is_ok());
    }

    #[tokio::test]
    #[ignore = "requires a running MongoDB"]
    async fn test_link_deployment_requires_existing_deployment() {
        let db = MongoDB::new("mongodb://localhost:27017", "phoenix_test").await.unwrap();
        let admin = caller("*", RoleName::SUPER_ADMIN);
        let request = CreateOrganizationRequest {
            name: "Clinic".to_string(),
            status: None,
        };
        let organization_id = create_organization(&db, &admin, &request).await.unwrap();

        let missing = LinkDeploymentRequest {
            deployment_id: ObjectId::new().to_hex(),
        };
        let err = link_deployment(&db, &admin, &organization_id, &missing).await.unwrap_err();
        assert!(matches!(err, AppError::ObjectDoesNotExist(_)));

        delete_organization(&db, &admin, &organization_id).await.unwrap();
    }
}
