use futures::stream::TryStreamExt;
use mongodb::bson::{doc, DateTime as BsonDateTime, Document};

use crate::database::MongoDB;
use crate::events::PostCreateModuleResultEvent;
use crate::models::{
    AuthorizedUser, ModuleConfigStatus, ModuleResult, ModuleResultResponse, PolicyType,
    QuestionnaireAnswer, RetrieveModuleResultsQuery, SubmitModuleResultRequest, MODULE_RESULTS_COLLECTION,
};
use crate::questionnaires::{calculator_for, Scores};
use crate::services::authorization_service::{check_self_or_policy_by_id, user_deployment_ids};
use crate::services::deployment_service::get_deployment;
use crate::services::identity_verification_service::check_onboarding;
use crate::state::AppContext;
use crate::utils::error::{AppError, AppResult};
use crate::utils::validators::{clamp_limit, clamp_skip};

/// Runs the module's calculator, if one is registered.
pub fn score_answers(
    module_id: &str,
    answers: &mut [QuestionnaireAnswer],
    config: &crate::models::ModuleConfig,
) -> AppResult<Option<Scores>> {
    match calculator_for(module_id) {
        Some(calculator) => calculator.calculate(answers, config).map(Some),
        None => Ok(None),
    }
}

pub async fn submit(
    ctx: &AppContext,
    caller: &AuthorizedUser,
    user_id: &str,
    module_id: &str,
    request: SubmitModuleResultRequest,
) -> AppResult<String> {
    let user = check_self_or_policy_by_id(&ctx.db, caller, user_id, PolicyType::EditPatientData).await?;

    let deployment = get_deployment(&ctx.db, &request.deployment_id).await?;
    let enrolled = user_deployment_ids(&ctx.db, &user).await?;
    if !enrolled.contains(&request.deployment_id) {
        return Err(AppError::permission_denied());
    }

    let config = deployment
        .find_module_config(module_id, request.module_config_id.as_deref())
        .filter(|config| config.module_id == module_id)
        .ok_or_else(|| {
            AppError::not_found(format!(
                "Module config for {} does not exist in deployment {}",
                module_id, request.deployment_id
            ))
        })?;
    if config.status == ModuleConfigStatus::Disabled {
        return Err(AppError::invalid_request(format!("Module {} is disabled", module_id)));
    }

    check_onboarding(&user, &deployment)?;

    let mut answers = request.answers;
    let scores: Option<Document> = match score_answers(module_id, &mut answers, config)? {
        Some(scores) => Some(mongodb::bson::to_document(&scores)?),
        None => None,
    };

    let result = ModuleResult {
        id: None,
        user_id: user_id.to_string(),
        deployment_id: request.deployment_id.clone(),
        module_id: module_id.to_string(),
        module_config_id: config.id.clone(),
        answers,
        scores,
        submitter_id: caller.id(),
        create_date_time: BsonDateTime::now(),
    };

    let inserted = ctx
        .db
        .collection::<ModuleResult>(MODULE_RESULTS_COLLECTION)
        .insert_one(&result)
        .await?;
    let result_id = inserted
        .inserted_id
        .as_object_id()
        .map(|id| id.to_hex())
        .unwrap_or_default();

    ctx.events
        .emit(
            &PostCreateModuleResultEvent {
                module_result_id: result_id.clone(),
                user_id: user_id.to_string(),
                deployment_id: request.deployment_id,
                module_id: module_id.to_string(),
            },
            false,
        )
        .await?;

    log::info!("📋 {} result {} stored for user {}", module_id, result_id, user_id);
    Ok(result_id)
}

pub async fn retrieve(
    db: &MongoDB,
    caller: &AuthorizedUser,
    user_id: &str,
    module_id: &str,
    query: &RetrieveModuleResultsQuery,
) -> AppResult<Vec<ModuleResultResponse>> {
    check_self_or_policy_by_id(db, caller, user_id, PolicyType::ViewPatientData).await?;

    let results: Vec<ModuleResult> = db
        .collection::<ModuleResult>(MODULE_RESULTS_COLLECTION)
        .find(doc! { "userId": user_id, "moduleId": module_id })
        .sort(doc! { "createDateTime": -1 })
        .skip(clamp_skip(query.skip))
        .limit(clamp_limit(query.limit))
        .await?
        .try_collect()
        .await?;

    Ok(results.into_iter().map(ModuleResultResponse::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questionnaires::test_support::{answer, choice_question, config};

    #[test]
    fn test_unscored_module_stores_no_scores() {
        let mut answers = vec![answer("weight", "72")];
        let scores = score_answers("Weight", &mut answers, &config("Weight", vec![])).unwrap();
        assert!(scores.is_none());
    }

    #[test]
    fn test_scores_convert_to_bson() {
        let labels = [("Not at all", 0.0), ("Nearly every day", 3.0)];
        let questions = (1..=7).map(|n| choice_question(&format!("gad7_q{}", n), &labels)).collect();
        let config = config("GAD7", questions);
        let mut answers: Vec<_> = (1..=7).map(|n| answer(&format!("gad7_q{}", n), "Nearly every day")).collect();

        let scores = score_answers("GAD7", &mut answers, &config).unwrap().unwrap();
        let document = mongodb::bson::to_document(&scores).unwrap();

        assert_eq!(document.get_i64("gad7Total").unwrap(), 21);
        assert_eq!(document.get_str("severity").unwrap(), "severe");
    }
}
