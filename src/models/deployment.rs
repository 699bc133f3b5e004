use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use super::format_datetime;
use super::role::Role;

pub const DEPLOYMENTS_COLLECTION: &str = "deployments";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    Draft,
    Deployed,
    Archived,
}

impl Default for DeploymentStatus {
    fn default() -> Self {
        DeploymentStatus::Draft
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleConfigStatus {
    Enabled,
    Disabled,
}

impl Default for ModuleConfigStatus {
    fn default() -> Self {
        ModuleConfigStatus::Enabled
    }
}

/// Questionnaire or module configuration attached to a deployment.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub module_id: String,
    #[serde(default)]
    pub module_name: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub config_body: serde_json::Value,
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub schedule: Option<serde_json::Value>,
    #[serde(default)]
    pub status: ModuleConfigStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessagingFeature {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub allow_custom_message: bool,
    #[serde(default)]
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Features {
    #[serde(default)]
    pub identity_verification_required: bool,
    #[serde(default)]
    pub messaging: MessagingFeature,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub status: DeploymentStatus,
    pub organization_id: Option<String>,
    #[serde(default)]
    pub module_configs: Vec<ModuleConfig>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub features: Features,
    pub create_date_time: BsonDateTime,
    pub update_date_time: BsonDateTime,
}

impl Deployment {
    pub fn id_hex(&self) -> String {
        self.id.map(|id| id.to_hex()).unwrap_or_default()
    }

    pub fn find_module_config(&self, module_id: &str, module_config_id: Option<&str>) -> Option<&ModuleConfig> {
        self.module_configs.iter().find(|config| match module_config_id {
            Some(config_id) => config.id.as_deref() == Some(config_id),
            None => config.module_id == module_id,
        })
    }

    /// Whether `text` may be sent as a non-custom message.
    pub fn is_predefined_message(&self, text: &str) -> bool {
        self.features.messaging.messages.iter().any(|m| m.trim() == text)
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeploymentRequest {
    pub name: String,
    pub description: Option<String>,
    pub status: Option<DeploymentStatus>,
    pub organization_id: Option<String>,
    pub features: Option<Features>,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDeploymentRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<DeploymentStatus>,
    pub features: Option<Features>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListDeploymentsRequest {
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub name_contains: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateRolesRequest {
    pub roles: Vec<Role>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: DeploymentStatus,
    pub organization_id: Option<String>,
    pub module_configs: Vec<ModuleConfig>,
    pub roles: Vec<Role>,
    pub features: Features,
    pub create_date_time: String,
    pub update_date_time: String,
}

impl From<Deployment> for DeploymentResponse {
    fn from(d: Deployment) -> Self {
        DeploymentResponse {
            id: d.id_hex(),
            name: d.name,
            description: d.description,
            status: d.status,
            organization_id: d.organization_id,
            module_configs: d.module_configs,
            roles: d.roles,
            features: d.features,
            create_date_time: format_datetime(&d.create_date_time),
            update_date_time: format_datetime(&d.update_date_time),
        }
    }
}

#[cfg(test)]
pub fn test_deployment() -> Deployment {
    Deployment {
        id: Some(ObjectId::new()),
        name: "Heart study".to_string(),
        description: None,
        status: DeploymentStatus::Deployed,
        organization_id: None,
        module_configs: vec![],
        roles: vec![],
        features: Features {
            identity_verification_required: false,
            messaging: MessagingFeature {
                enabled: true,
                allow_custom_message: false,
                messages: vec!["Please complete your questionnaire".to_string()],
            },
        },
        create_date_time: BsonDateTime::now(),
        update_date_time: BsonDateTime::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_features_default_when_missing() {
        let raw = mongodb::bson::doc! {
            "name": "x",
            "createDateTime": BsonDateTime::now(),
            "updateDateTime": BsonDateTime::now(),
        };
        let deployment: Deployment = mongodb::bson::from_document(raw).unwrap();
        assert!(!deployment.features.messaging.allow_custom_message);
        assert_eq!(deployment.status, DeploymentStatus::Draft);
    }

    #[test]
    fn test_find_module_config() {
        let mut deployment = test_deployment();
        deployment.module_configs.push(ModuleConfig {
            id: Some("c1".to_string()),
            module_id: "KCCQ".to_string(),
            module_name: None,
            config_body: serde_json::json!({}),
            about: None,
            schedule: None,
            status: ModuleConfigStatus::Enabled,
        });

        assert!(deployment.find_module_config("KCCQ", None).is_some());
        assert!(deployment.find_module_config("KCCQ", Some("c1")).is_some());
        assert!(deployment.find_module_config("KCCQ", Some("c2")).is_none());
        assert!(deployment.find_module_config("GAD7", None).is_none());
    }

    #[test]
    fn test_predefined_messages() {
        let deployment = test_deployment();
        assert!(deployment.is_predefined_message("Please complete your questionnaire"));
        assert!(!deployment.is_predefined_message("Hello"));
    }
}
