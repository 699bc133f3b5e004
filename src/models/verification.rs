use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use super::format_datetime;

pub const VERIFICATION_LOGS_COLLECTION: &str = "verificationlog";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Complete,
    InProgress,
    AwaitingApplicant,
    Withdrawn,
    Paused,
    Reopened,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckResult {
    Clear,
    Consider,
    Unidentified,
}

/// Completed check as posted by the verification provider.
///
/// Status and result arrive lower-case (`complete`, `clear`).
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerificationCheck {
    pub id: String,
    #[serde(alias = "applicant_id")]
    pub applicant_id: String,
    pub status: String,
    pub result: Option<String>,
    #[serde(default)]
    pub documents: Vec<String>,
}

impl VerificationCheck {
    pub fn check_status(&self) -> Option<CheckStatus> {
        match self.status.to_lowercase().as_str() {
            "complete" => Some(CheckStatus::Complete),
            "in_progress" => Some(CheckStatus::InProgress),
            "awaiting_applicant" => Some(CheckStatus::AwaitingApplicant),
            "withdrawn" => Some(CheckStatus::Withdrawn),
            "paused" => Some(CheckStatus::Paused),
            "reopened" => Some(CheckStatus::Reopened),
            _ => None,
        }
    }

    pub fn check_result(&self) -> Option<CheckResult> {
        match self.result.as_deref().map(str::to_lowercase).as_deref() {
            Some("clear") => Some(CheckResult::Clear),
            Some("consider") => Some(CheckResult::Consider),
            Some("unidentified") => Some(CheckResult::Unidentified),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationLog {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: String,
    pub applicant_id: String,
    pub check_id: Option<String>,
    pub verification_status: Option<CheckStatus>,
    pub verification_result: Option<CheckResult>,
    #[serde(default)]
    pub documents: Vec<String>,
    pub create_date_time: BsonDateTime,
    pub update_date_time: BsonDateTime,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerificationLogResponse {
    pub id: String,
    pub user_id: String,
    pub applicant_id: String,
    pub check_id: Option<String>,
    pub verification_status: Option<CheckStatus>,
    pub verification_result: Option<CheckResult>,
    pub documents: Vec<String>,
    pub create_date_time: String,
    pub update_date_time: String,
}

impl From<VerificationLog> for VerificationLogResponse {
    fn from(log: VerificationLog) -> Self {
        VerificationLogResponse {
            id: log.id.map(|id| id.to_hex()).unwrap_or_default(),
            user_id: log.user_id,
            applicant_id: log.applicant_id,
            check_id: log.check_id,
            verification_status: log.verification_status,
            verification_result: log.verification_result,
            documents: log.documents,
            create_date_time: format_datetime(&log.create_date_time),
            update_date_time: format_datetime(&log.update_date_time),
        }
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterApplicantRequest {
    pub applicant_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_parses_provider_casing() {
        let check: VerificationCheck = serde_json::from_value(serde_json::json!({
            "id": "chk_1",
            "applicant_id": "app_1",
            "status": "complete",
            "result": "clear"
        }))
        .unwrap();

        assert_eq!(check.applicant_id, "app_1");
        assert_eq!(check.check_status(), Some(CheckStatus::Complete));
        assert_eq!(check.check_result(), Some(CheckResult::Clear));
    }

    #[test]
    fn test_unknown_values_are_none() {
        let check = VerificationCheck {
            id: "c".into(),
            applicant_id: "a".into(),
            status: "exploded".into(),
            result: None,
            documents: vec![],
        };
        assert!(check.check_status().is_none());
        assert!(check.check_result().is_none());
    }
}
