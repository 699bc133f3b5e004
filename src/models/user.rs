use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use super::format_datetime;
use super::role::{RoleAssignment, RoleName};

pub const USERS_COLLECTION: &str = "users";
pub const SESSIONS_COLLECTION: &str = "sessions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    IdVerificationNeeded,
    IdVerificationInProcess,
    IdVerificationSucceeded,
    IdVerificationFailed,
}

impl VerificationStatus {
    /// Wire name, as stored and sent to clients.
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::IdVerificationNeeded => "ID_VERIFICATION_NEEDED",
            VerificationStatus::IdVerificationInProcess => "ID_VERIFICATION_IN_PROCESS",
            VerificationStatus::IdVerificationSucceeded => "ID_VERIFICATION_SUCCEEDED",
            VerificationStatus::IdVerificationFailed => "ID_VERIFICATION_FAILED",
        }
    }
}

/// Stored user: credentials and profile share one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub language: Option<String>,
    pub phone_number: Option<String>,
    #[serde(default)]
    pub roles: Vec<RoleAssignment>,
    pub verification_status: Option<VerificationStatus>,
    pub onfido_applicant_id: Option<String>,
    pub last_sign_in: Option<BsonDateTime>,
    pub create_date_time: BsonDateTime,
    pub update_date_time: BsonDateTime,
}

impl User {
    pub fn id_hex(&self) -> String {
        self.id.map(|id| id.to_hex()).unwrap_or_default()
    }

    /// Role names, used as token claims.
    pub fn role_ids(&self) -> Vec<String> {
        if self.roles.is_empty() {
            return vec![RoleName::USER.to_string()];
        }
        let mut ids: Vec<String> = self.roles.iter().map(|r| r.role_id.clone()).collect();
        ids.dedup();
        ids
    }

    pub fn deployment_ids(&self) -> Vec<String> {
        self.roles
            .iter()
            .filter_map(|r| r.deployment_id().map(str::to_string))
            .collect()
    }
}

/// A refresh-token session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: String,
    pub refresh_jti: String,
    pub device_agent: Option<String>,
    pub created_at: BsonDateTime,
    pub expires_at: BsonDateTime,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: String,
    pub device_agent: Option<String>,
    pub created_at: String,
    pub expires_at: String,
}

impl From<Session> for SessionResponse {
    fn from(s: Session) -> Self {
        SessionResponse {
            id: s.id.map(|id| id.to_hex()).unwrap_or_default(),
            device_agent: s.device_agent,
            created_at: format_datetime(&s.created_at),
            expires_at: format_datetime(&s.expires_at),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub language: Option<String>,
    pub phone_number: Option<String>,
    pub roles: Vec<RoleAssignment>,
    pub verification_status: Option<VerificationStatus>,
    pub create_date_time: String,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile {
            id: user.id_hex(),
            email: user.email,
            display_name: user.display_name,
            language: user.language,
            phone_number: user.phone_number,
            roles: user.roles,
            verification_status: user.verification_status,
            create_date_time: format_datetime(&user.create_date_time),
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub language: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddRoleRequest {
    pub role_id: String,
    pub resource: String,
}

#[cfg(test)]
pub fn test_user(roles: Vec<RoleAssignment>) -> User {
    User {
        id: Some(ObjectId::new()),
        email: "user@example.com".to_string(),
        password_hash: String::new(),
        display_name: Some("Test User".to_string()),
        language: Some("en".to_string()),
        phone_number: None,
        roles,
        verification_status: None,
        onfido_applicant_id: None,
        last_sign_in: None,
        create_date_time: BsonDateTime::now(),
        update_date_time: BsonDateTime::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ids_default_to_user() {
        let user = test_user(vec![]);
        assert_eq!(user.role_ids(), vec!["User"]);
    }

    #[test]
    fn test_verification_status_wire_name_matches_serde() {
        for status in [
            VerificationStatus::IdVerificationNeeded,
            VerificationStatus::IdVerificationInProcess,
            VerificationStatus::IdVerificationSucceeded,
            VerificationStatus::IdVerificationFailed,
        ] {
            assert_eq!(serde_json::to_value(status).unwrap(), status.as_str());
        }
    }

    #[test]
    fn test_deployment_ids_only_from_deployment_resources() {
        let user = test_user(vec![
            RoleAssignment::for_deployment("Admin", "d1"),
            RoleAssignment::for_organization("OrganizationOwner", "o1"),
            RoleAssignment::for_deployment("Contributor", "d2"),
        ]);
        assert_eq!(user.deployment_ids(), vec!["d1", "d2"]);
    }

    #[test]
    fn test_profile_never_exposes_password_hash() {
        let mut user = test_user(vec![]);
        user.password_hash = "$2b$12$secret".to_string();
        let json = serde_json::to_value(UserProfile::from(user)).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["displayName"], "Test User");
    }
}
