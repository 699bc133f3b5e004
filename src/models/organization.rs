use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use super::format_datetime;
use super::role::Role;

pub const ORGANIZATIONS_COLLECTION: &str = "organizations";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrganizationStatus {
    Active,
    Inactive,
}

impl Default for OrganizationStatus {
    fn default() -> Self {
        OrganizationStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    #[serde(default)]
    pub status: OrganizationStatus,
    #[serde(default)]
    pub deployment_ids: Vec<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
    pub create_date_time: BsonDateTime,
    pub update_date_time: BsonDateTime,
}

impl Organization {
    pub fn id_hex(&self) -> String {
        self.id.map(|id| id.to_hex()).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateOrganizationRequest {
    pub name: String,
    pub status: Option<OrganizationStatus>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateOrganizationRequest {
    pub name: Option<String>,
    pub status: Option<OrganizationStatus>,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct ListOrganizationsRequest {
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkDeploymentRequest {
    pub deployment_id: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationResponse {
    pub id: String,
    pub name: String,
    pub status: OrganizationStatus,
    pub deployment_ids: Vec<String>,
    pub roles: Vec<Role>,
    pub create_date_time: String,
    pub update_date_time: String,
}

impl From<Organization> for OrganizationResponse {
    fn from(o: Organization) -> Self {
        OrganizationResponse {
            id: o.id_hex(),
            name: o.name,
            status: o.status,
            deployment_ids: o.deployment_ids,
            roles: o.roles,
            create_date_time: format_datetime(&o.create_date_time),
            update_date_time: format_datetime(&o.update_date_time),
        }
    }
}
