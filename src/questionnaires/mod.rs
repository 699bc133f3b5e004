//! Scoring calculators for questionnaire modules.
//!
//! A calculator receives the submitted answers together with the module
//! configuration of the deployment and returns a flat JSON object of scores.
//! Calculators may also fill in `answer_score` on individual answers.

pub mod diabetes_distress;
pub mod eq5d;
pub mod gad7;
pub mod kccq;
pub mod lysholm;
pub mod norfolk;
pub mod promis;

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::models::{ModuleConfig, QuestionnaireAnswer};
use crate::utils::error::{AppError, AppResult};

pub type Scores = Map<String, Value>;

pub trait ScoreCalculator: Send + Sync {
    fn calculate(&self, answers: &mut [QuestionnaireAnswer], config: &ModuleConfig) -> AppResult<Scores>;
}

/// Returns the calculator registered for `module_id`, if any.
pub fn calculator_for(module_id: &str) -> Option<Box<dyn ScoreCalculator>> {
    match module_id {
        "KCCQ" => Some(Box::new(kccq::KccqCalculator)),
        "DiabetesDistressScore" => Some(Box::new(diabetes_distress::DiabetesDistressCalculator)),
        "Norfolk" => Some(Box::new(norfolk::NorfolkCalculator)),
        "EQ5D5L" => Some(Box::new(eq5d::Eq5dCalculator)),
        "PROMISGlobalHealth" => Some(Box::new(promis::PromisGlobalHealthCalculator)),
        "Lysholm" => Some(Box::new(lysholm::LysholmCalculator)),
        "GAD7" => Some(Box::new(gad7::Gad7Calculator)),
        _ => None,
    }
}

/// Question id to question, walking `pages[].items[]` and nested items.
pub fn question_map(config_body: &Value) -> HashMap<&str, &Value> {
    fn walk<'a>(items: &'a Value, map: &mut HashMap<&'a str, &'a Value>) {
        let Some(items) = items.as_array() else {
            return;
        };
        for item in items {
            if let Some(id) = item.get("id").and_then(Value::as_str) {
                map.insert(id, item);
            }
            if let Some(nested) = item.get("items") {
                walk(nested, map);
            }
        }
    }

    let mut map = HashMap::new();
    if let Some(pages) = config_body.get("pages").and_then(Value::as_array) {
        for page in pages {
            if let Some(items) = page.get("items") {
                walk(items, &mut map);
            }
        }
    }
    map
}

pub fn option_by_label<'a>(question: &'a Value, label: &str) -> Option<&'a Value> {
    question
        .get("options")?
        .as_array()?
        .iter()
        .find(|option| option.get("label").and_then(Value::as_str) == Some(label))
}

/// Numbers may be stored as JSON numbers or numeric strings.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Weight of the option chosen by `answer`.
///
/// The option must exist and carry both a `value` and a `weight`.
pub fn option_weight(question: &Value, answer: &QuestionnaireAnswer) -> AppResult<f64> {
    option_weight_for_label(question, answer.text(), &answer.question_id)
}

pub fn option_weight_for_label(question: &Value, label: &str, question_id: &str) -> AppResult<f64> {
    let option = option_by_label(question, label)
        .ok_or_else(|| AppError::invalid_request(format!("Answer {} is not an option", label)))?;

    let missing = || {
        AppError::invalid_request(format!(
            "The question {} doesn't have answer options configured with value",
            question_id
        ))
    };
    if option.get("value").is_none() {
        return Err(missing());
    }
    option.get("weight").and_then(as_number).ok_or_else(missing)
}

/// Numeric score of an answer: explicit value, then option weight, then text.
pub fn answer_number(answer: &QuestionnaireAnswer, questions: &HashMap<&str, &Value>) -> AppResult<f64> {
    if let Some(value) = answer.value {
        return Ok(value);
    }
    if let Some(question) = questions.get(answer.question_id.as_str()) {
        if option_by_label(question, answer.text()).is_some() {
            return option_weight(question, answer);
        }
    }
    answer.text().trim().parse::<f64>().map_err(|_| {
        AppError::invalid_request(format!(
            "Answer {} of question {} is not a number",
            answer.text(),
            answer.question_id
        ))
    })
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn insert_number(scores: &mut Scores, key: &str, value: f64) {
    scores.insert(key.to_string(), Value::from(value));
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::ModuleConfigStatus;
    use serde_json::json;

    pub fn choice_question(id: &str, labels_and_weights: &[(&str, f64)]) -> Value {
        let options: Vec<Value> = labels_and_weights
            .iter()
            .map(|(label, weight)| json!({ "label": label, "value": label, "weight": weight }))
            .collect();
        json!({ "id": id, "format": "TEXTCHOICE", "options": options })
    }

    pub fn config(module_id: &str, questions: Vec<Value>) -> ModuleConfig {
        ModuleConfig {
            id: Some("config-1".to_string()),
            module_id: module_id.to_string(),
            module_name: None,
            config_body: json!({ "pages": [{ "items": questions }] }),
            about: None,
            schedule: None,
            status: ModuleConfigStatus::Enabled,
        }
    }

    pub fn answer(question_id: &str, text: &str) -> QuestionnaireAnswer {
        QuestionnaireAnswer {
            question_id: question_id.to_string(),
            question: format!("Question {}", question_id),
            answer_text: Some(text.to_string()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_question_map_walks_nested_items() {
        let body = json!({
            "pages": [
                { "items": [{ "id": "q1" }, { "id": "section", "items": [{ "id": "q2" }] }] },
                { "items": [{ "id": "q3" }, { "text": "no id" }] }
            ]
        });
        let map = question_map(&body);

        assert_eq!(map.len(), 4);
        assert!(map.contains_key("q2"));
        assert!(map.contains_key("section"));
    }

    #[test]
    fn test_option_weight_errors() {
        let question = choice_question("q1", &[("Yes", 1.0)]);

        assert_eq!(option_weight(&question, &answer("q1", "Yes")).unwrap(), 1.0);
        assert!(matches!(
            option_weight(&question, &answer("q1", "Maybe")),
            Err(AppError::InvalidRequest(_))
        ));

        let no_value = json!({ "id": "q2", "options": [{ "label": "Yes", "weight": 1 }] });
        assert!(option_weight(&no_value, &answer("q2", "Yes")).is_err());
    }

    #[test]
    fn test_answer_number_prefers_explicit_value() {
        let questions_body = json!({ "pages": [{ "items": [choice_question("q1", &[("High", 3.0)])] }] });
        let questions = question_map(&questions_body);

        let mut explicit = answer("q1", "High");
        explicit.value = Some(7.0);
        assert_eq!(answer_number(&explicit, &questions).unwrap(), 7.0);
        assert_eq!(answer_number(&answer("q1", "High"), &questions).unwrap(), 3.0);
        assert_eq!(answer_number(&answer("free", " 4 "), &questions).unwrap(), 4.0);
        assert!(answer_number(&answer("free", "four"), &questions).is_err());
    }

    #[test]
    fn test_registry() {
        for module_id in ["KCCQ", "DiabetesDistressScore", "Norfolk", "EQ5D5L", "PROMISGlobalHealth", "Lysholm", "GAD7"] {
            assert!(calculator_for(module_id).is_some(), "{}", module_id);
        }
        assert!(calculator_for("Weight").is_none());
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(2.345_678), 2.35);
        assert_eq!(round2(3.0), 3.0);
    }
}
