use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use super::format_datetime;

pub const MODULE_RESULTS_COLLECTION: &str = "moduleresult";

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireAnswer {
    #[serde(default)]
    pub question_id: String,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Filled in by the scoring calculators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl QuestionnaireAnswer {
    pub fn text(&self) -> &str {
        self.answer_text.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleResult {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: String,
    pub deployment_id: String,
    pub module_id: String,
    pub module_config_id: Option<String>,
    pub answers: Vec<QuestionnaireAnswer>,
    pub scores: Option<mongodb::bson::Document>,
    pub submitter_id: String,
    pub create_date_time: BsonDateTime,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitModuleResultRequest {
    pub deployment_id: String,
    pub module_config_id: Option<String>,
    pub answers: Vec<QuestionnaireAnswer>,
}

#[derive(Debug, Deserialize)]
pub struct RetrieveModuleResultsQuery {
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleResultResponse {
    pub id: String,
    pub user_id: String,
    pub deployment_id: String,
    pub module_id: String,
    pub module_config_id: Option<String>,
    pub answers: Vec<QuestionnaireAnswer>,
    #[schema(value_type = Object)]
    pub scores: Option<serde_json::Value>,
    pub submitter_id: String,
    pub create_date_time: String,
}

impl From<ModuleResult> for ModuleResultResponse {
    fn from(r: ModuleResult) -> Self {
        ModuleResultResponse {
            id: r.id.map(|id| id.to_hex()).unwrap_or_default(),
            user_id: r.user_id,
            deployment_id: r.deployment_id,
            module_id: r.module_id,
            module_config_id: r.module_config_id,
            answers: r.answers,
            scores: r
                .scores
                .map(|doc| mongodb::bson::Bson::Document(doc).into_relaxed_extjson()),
            submitter_id: r.submitter_id,
            create_date_time: format_datetime(&r.create_date_time),
        }
    }
}
