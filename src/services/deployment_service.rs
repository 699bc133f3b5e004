use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document, Regex as BsonRegex};

use crate::database::MongoDB;
use crate::models::{
    AuthorizedUser, CreateDeploymentRequest, CustomRolesExtension, Deployment, DeploymentResponse,
    ListDeploymentsRequest, ModuleConfig, Organization, PolicyType, Role, UpdateDeploymentRequest,
    DEPLOYMENTS_COLLECTION, ORGANIZATIONS_COLLECTION,
};
use crate::utils::error::{AppError, AppResult};
use crate::utils::validators::{clamp_limit, clamp_skip, parse_object_id, validate_entity_name};

pub const MAX_DEPLOYMENT_NAME_LENGTH: usize = 80;

fn resource(deployment_id: &str) -> String {
    format!("deployment/{}", deployment_id)
}

fn require_policy(caller: &AuthorizedUser, deployment_id: &str, policy: PolicyType) -> AppResult<()> {
    if caller.has_policy_for(&resource(deployment_id), policy) {
        Ok(())
    } else {
        Err(AppError::permission_denied())
    }
}

fn require_super_admin(caller: &AuthorizedUser) -> AppResult<()> {
    if caller.is_super_admin() {
        Ok(())
    } else {
        Err(AppError::permission_denied())
    }
}

pub async fn get_deployment(db: &MongoDB, deployment_id: &str) -> AppResult<Deployment> {
    let oid = parse_object_id(deployment_id, "deploymentId")?;
    db.collection::<Deployment>(DEPLOYMENTS_COLLECTION)
        .find_one(doc! { "_id": oid })
        .await?
        .ok_or_else(|| AppError::not_found(format!("Deployment {} does not exist", deployment_id)))
}

pub async fn create_deployment(
    db: &MongoDB,
    caller: &AuthorizedUser,
    request: &CreateDeploymentRequest,
) -> AppResult<String> {
    require_super_admin(caller)?;
    let name = validate_entity_name(&request.name, MAX_DEPLOYMENT_NAME_LENGTH)?;

    let organization_oid = match &request.organization_id {
        Some(organization_id) => Some(parse_object_id(organization_id, "organizationId")?),
        None => None,
    };

    let now = BsonDateTime::now();
    let deployment = Deployment {
        id: None,
        name,
        description: request.description.clone(),
        status: request.status.unwrap_or_default(),
        organization_id: request.organization_id.clone(),
        module_configs: vec![],
        roles: vec![],
        features: request.features.clone().unwrap_or_default(),
        create_date_time: now,
        update_date_time: now,
    };

    let inserted = db
        .collection::<Deployment>(DEPLOYMENTS_COLLECTION)
        .insert_one(&deployment)
        .await?;
    let deployment_id = inserted
        .inserted_id
        .as_object_id()
        .map(|id| id.to_hex())
        .ok_or_else(|| AppError::Internal("Deployment inserted without ObjectId".to_string()))?;

    if let Some(oid) = organization_oid {
        let result = db
            .collection::<Organization>(ORGANIZATIONS_COLLECTION)
            .update_one(
                doc! { "_id": oid },
                doc! {
                    "$addToSet": { "deploymentIds": &deployment_id },
                    "$set": { "updateDateTime": now },
                },
            )
            .await?;
        if result.matched_count == 0 {
            log::warn!("⚠️  Deployment {} references missing organization {}", deployment_id, oid);
        }
    }

    log::info!("🏥 Deployment {} created by {}", deployment_id, caller.id());
    Ok(deployment_id)
}

/// Enrolled users and holders of VIEW_DEPLOYMENT may read a deployment.
pub async fn retrieve_deployment(
    db: &MongoDB,
    caller: &AuthorizedUser,
    deployment_id: &str,
) -> AppResult<DeploymentResponse> {
    let enrolled = caller.deployment_ids().iter().any(|id| id == deployment_id);
    if !enrolled {
        require_policy(caller, deployment_id, PolicyType::ViewDeployment)?;
    }
    Ok(get_deployment(db, deployment_id).await?.into())
}

pub fn list_filter(caller: &AuthorizedUser, request: &ListDeploymentsRequest) -> Document {
    let mut filter = Document::new();

    if !caller.is_super_admin() {
        let ids: Vec<ObjectId> = caller
            .deployment_ids()
            .iter()
            .filter_map(|id| ObjectId::parse_str(id).ok())
            .collect();
        filter.insert("_id", doc! { "$in": ids });
    }

    if let Some(name) = request.name_contains.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        filter.insert(
            "name",
            BsonRegex {
                pattern: regex::escape(name),
                options: "i".to_string(),
            },
        );
    }
    filter
}

pub async fn list_deployments(
    db: &MongoDB,
    caller: &AuthorizedUser,
    request: &ListDeploymentsRequest,
) -> AppResult<Vec<DeploymentResponse>> {
    let deployments: Vec<Deployment> = db
        .collection::<Deployment>(DEPLOYMENTS_COLLECTION)
        .find(list_filter(caller, request))
        .sort(doc! { "createDateTime": -1 })
        .skip(clamp_skip(request.skip))
        .limit(clamp_limit(request.limit))
        .await?
        .try_collect()
        .await?;

    Ok(deployments.into_iter().map(DeploymentResponse::from).collect())
}

pub fn update_document(request: &UpdateDeploymentRequest) -> AppResult<Document> {
    let mut set = doc! { "updateDateTime": BsonDateTime::now() };
    if let Some(name) = &request.name {
        set.insert("name", validate_entity_name(name, MAX_DEPLOYMENT_NAME_LENGTH)?);
    }
    if let Some(description) = &request.description {
        set.insert("description", description.trim());
    }
    if let Some(status) = &request.status {
        set.insert("status", mongodb::bson::to_bson(status)?);
    }
    if let Some(features) = &request.features {
        set.insert("features", mongodb::bson::to_bson(features)?);
    }
    Ok(set)
}

pub async fn update_deployment(
    db: &MongoDB,
    caller: &AuthorizedUser,
    deployment_id: &str,
    request: &UpdateDeploymentRequest,
) -> AppResult<String> {
    require_policy(caller, deployment_id, PolicyType::EditDeployment)?;
    let oid = parse_object_id(deployment_id, "deploymentId")?;

    let result = db
        .collection::<Deployment>(DEPLOYMENTS_COLLECTION)
        .update_one(doc! { "_id": oid }, doc! { "$set": update_document(request)? })
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::not_found(format!("Deployment {} does not exist", deployment_id)));
    }

    Ok(deployment_id.to_string())
}

pub async fn delete_deployment(db: &MongoDB, caller: &AuthorizedUser, deployment_id: &str) -> AppResult<()> {
    require_super_admin(caller)?;
    let oid = parse_object_id(deployment_id, "deploymentId")?;

    let result = db
        .collection::<Deployment>(DEPLOYMENTS_COLLECTION)
        .delete_one(doc! { "_id": oid })
        .await?;
    if result.deleted_count == 0 {
        return Err(AppError::not_found(format!("Deployment {} does not exist", deployment_id)));
    }

    db.collection::<Organization>(ORGANIZATIONS_COLLECTION)
        .update_many(
            doc! { "deploymentIds": deployment_id },
            doc! { "$pull": { "deploymentIds": deployment_id } },
        )
        .await?;

    log::info!("🗑️  Deployment {} deleted by {}", deployment_id, caller.id());
    Ok(())
}

/// Validates a module config and gives new ones an id.
pub fn prepare_module_config(mut config: ModuleConfig) -> AppResult<ModuleConfig> {
    if config.module_id.trim().is_empty() {
        return Err(AppError::invalid_request("moduleId is required"));
    }
    if !config.config_body.is_object() {
        return Err(AppError::InvalidModuleConfigBody(format!(
            "configBody of module {} must be an object",
            config.module_id
        )));
    }
    if config.id.is_none() {
        config.id = Some(ObjectId::new().to_hex());
    }
    Ok(config)
}

pub async fn create_or_update_module_config(
    db: &MongoDB,
    caller: &AuthorizedUser,
    deployment_id: &str,
    config: ModuleConfig,
) -> AppResult<String> {
    require_policy(caller, deployment_id, PolicyType::EditDeployment)?;
    let oid = parse_object_id(deployment_id, "deploymentId")?;
    let is_new = config.id.is_none();
    let config = prepare_module_config(config)?;
    let config_id = config.id.clone().unwrap_or_default();
    let config_bson = mongodb::bson::to_bson(&config)?;
    let now = BsonDateTime::now();

    let collection = db.collection::<Deployment>(DEPLOYMENTS_COLLECTION);
    let result = if is_new {
        collection
            .update_one(
                doc! { "_id": oid },
                doc! {
                    "$push": { "moduleConfigs": config_bson },
                    "$set": { "updateDateTime": now },
                },
            )
            .await?
    } else {
        collection
            .update_one(
                doc! { "_id": oid, "moduleConfigs.id": &config_id },
                doc! { "$set": { "moduleConfigs.$": config_bson, "updateDateTime": now } },
            )
            .await?
    };

    if result.matched_count == 0 {
        return Err(AppError::not_found(format!(
            "Deployment {} or module config {} does not exist",
            deployment_id, config_id
        )));
    }

    log::info!("🧩 Module config {} ({}) saved on {}", config_id, config.module_id, deployment_id);
    Ok(config_id)
}

pub async fn delete_module_config(
    db: &MongoDB,
    caller: &AuthorizedUser,
    deployment_id: &str,
    module_config_id: &str,
) -> AppResult<()> {
    require_policy(caller, deployment_id, PolicyType::EditDeployment)?;
    let oid = parse_object_id(deployment_id, "deploymentId")?;

    let result = db
        .collection::<Deployment>(DEPLOYMENTS_COLLECTION)
        .update_one(
            doc! { "_id": oid, "moduleConfigs.id": module_config_id },
            doc! {
                "$pull": { "moduleConfigs": { "id": module_config_id } },
                "$set": { "updateDateTime": BsonDateTime::now() },
            },
        )
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::not_found(format!("Module config {} does not exist", module_config_id)));
    }
    Ok(())
}

/// Applies incoming custom roles over the stored ones.
///
/// Roles without an id are created, roles with an id replace the stored role.
/// Stored roles that are not sent are kept.
pub fn merge_custom_roles(existing: &[Role], incoming: Vec<Role>) -> AppResult<Vec<Role>> {
    CustomRolesExtension { roles: existing }.validate_roles(&incoming)?;

    let mut merged = existing.to_vec();
    for mut role in incoming {
        role.normalize_permissions();
        match role.id.clone() {
            Some(id) => {
                if let Some(slot) = merged.iter_mut().find(|r| r.id.as_deref() == Some(id.as_str())) {
                    *slot = role;
                }
            }
            None => {
                role.id = Some(ObjectId::new().to_hex());
                merged.push(role);
            }
        }
    }
    Ok(merged)
}

pub async fn create_or_update_roles(
    db: &MongoDB,
    caller: &AuthorizedUser,
    deployment_id: &str,
    roles: Vec<Role>,
) -> AppResult<Vec<String>> {
    require_policy(caller, deployment_id, PolicyType::EditCustomRoles)?;
    let deployment = get_deployment(db, deployment_id).await?;
    let merged = merge_custom_roles(&deployment.roles, roles)?;
    let oid = parse_object_id(deployment_id, "deploymentId")?;

    db.collection::<Deployment>(DEPLOYMENTS_COLLECTION)
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
