//! Norfolk Quality of Life - Diabetic Neuropathy.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::ops::RangeInclusive;

use super::{as_number, insert_number, option_by_label, question_map, ScoreCalculator, Scores};
use crate::models::{ModuleConfig, QuestionnaireAnswer};
use crate::utils::error::{AppError, AppResult};

lazy_static! {
    static ref QUESTION_ID: Regex =
        Regex::new(r"^hu_norfolk_(?P<subscale>.*?)_q(?P<number>\d+)(?P<sub>[a-z])*$").expect("valid regex");
}

type QuestionRanges = &'static [RangeInclusive<u32>];

const SUBSCALES: [(&str, QuestionRanges); 6] = [
    ("totalQolScore", &[18..=52]),
    ("physicalFunctionLargerFiber", &[25..=25, 28..=28, 30..=32, 41..=41, 44..=52]),
    ("activitiesOfDailyLiving", &[29..=29, 39..=40, 42..=43]),
    ("symptoms", &[18..=24, 26..=26]),
    ("smallFiber", &[27..=27, 33..=35]),
    ("autonomic", &[36..=38]),
];

fn weight_of(label: &str, question: &Value, answer: &QuestionnaireAnswer) -> AppResult<f64> {
    let option = option_by_label(question, label)
        .ok_or_else(|| AppError::invalid_request(format!("Answer {} is not an option", label)))?;
    option.get("weight").and_then(as_number).ok_or_else(|| {
        AppError::invalid_request(format!(
            "The question {} doesn't have answer options configured with value",
            answer.question_id
        ))
    })
}

/// Score of a single answer. Multiple choice symptom questions score 0 when
/// any chosen option weighs 0, otherwise 1.
fn answer_score(question: &Value, answer: &QuestionnaireAnswer) -> AppResult<f64> {
    let has_options = question
        .get("options")
        .and_then(Value::as_array)
        .map(|options| !options.is_empty())
        .unwrap_or(false);
    if !has_options {
        return Ok(0.0);
    }

    if question.get("selectionCriteria").and_then(Value::as_str) == Some("MULTIPLE") {
        let mut any_zero = false;
        for label in answer.text().split(',') {
            if weight_of(label, question, answer)? == 0.0 {
                any_zero = true;
            }
        }
        return Ok(if any_zero { 0.0 } else { 1.0 });
    }

    weight_of(answer.text(), question, answer)
}

pub struct NorfolkCalculator;

impl ScoreCalculator for NorfolkCalculator {
    fn calculate(&self, answers: &mut [QuestionnaireAnswer], config: &ModuleConfig) -> AppResult<Scores> {
        let questions = question_map(&config.config_body);
        let mut values: HashMap<u32, f64> = HashMap::new();

        for answer in answers.iter() {
            let captures = QUESTION_ID.captures(&answer.question_id).ok_or_else(|| {
                AppError::invalid_request(
                    "Wrong answer questionId format, it should be hu_norfolk_subscale_questionNumber[questionSubNumber]",
                )
            })?;
            let number: u32 = captures["number"]
                .parse()
                .map_err(|_| AppError::invalid_request("Invalid question number"))?;
            let question = questions.get(answer.question_id.as_str()).ok_or_else(|| {
                AppError::invalid_request(format!("questionId {} is invalid", answer.question_id))
            })?;

            values.insert(number, answer_score(question, answer)?);
        }

        let mut scores = Scores::new();
        for (name, ranges) in SUBSCALES {
            let total: f64 = ranges
                .iter()
                .flat_map(|range| range.clone())
                .filter_map(|number| values.get(&number))
                .sum();
            insert_number(&mut scores, name, total);
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questionnaires::test_support::{answer, choice_question, config};
    use serde_json::json;

    fn scale(id: &str) -> Value {
        choice_question(id, &[("Never", 0.0), ("Sometimes", 2.0), ("Always", 4.0)])
    }

    #[test]
    fn test_subscale_sums() {
        let config = config(
            "Norfolk",
            vec![
                scale("hu_norfolk_symptoms_q18"),
                scale("hu_norfolk_physical_q25"),
                scale("hu_norfolk_autonomic_q37"),
                scale("hu_norfolk_daily_q40"),
            ],
        );
        let mut answers = vec![
            answer("hu_norfolk_symptoms_q18", "Always"),
            answer("hu_norfolk_physical_q25", "Sometimes"),
            answer("hu_norfolk_autonomic_q37", "Always"),
            answer("hu_norfolk_daily_q40", "Never"),
        ];

        let scores = NorfolkCalculator.calculate(&mut answers, &config).unwrap();

        assert_eq!(scores["totalQolScore"], 10.0);
        assert_eq!(scores["symptoms"], 4.0);
        assert_eq!(scores["physicalFunctionLargerFiber"], 2.0);
        assert_eq!(scores["autonomic"], 4.0);
        assert_eq!(scores["activitiesOfDailyLiving"], 0.0);
        assert_eq!(scores["smallFiber"], 0.0);
    }

    #[test]
    fn test_multiple_choice_scores_zero_or_one() {
        let mut question = choice_question("hu_norfolk_symptoms_q1a", &[("None", 0.0), ("Numbness", 1.0), ("Tingling", 1.0)]);
        question["selectionCriteria"] = json!("MULTIPLE");

        assert_eq!(answer_score(&question, &answer("hu_norfolk_symptoms_q1a", "Numbness,Tingling")).unwrap(), 1.0);
        assert_eq!(answer_score(&question, &answer("hu_norfolk_symptoms_q1a", "Numbness,None")).unwrap(), 0.0);
        assert!(answer_score(&question, &answer("hu_norfolk_symptoms_q1a", "Numbness,Burning")).is_err());
    }

    #[test]
    fn test_question_without_options_scores_zero() {
        let question = json!({ "id": "hu_norfolk_info_q30", "format": "TEXT" });
        assert_eq!(answer_score(&question, &answer("hu_norfolk_info_q30", "anything")).unwrap(), 0.0);
    }

    #[test]
    fn test_unknown_question_rejected() {
        let mut answers = vec![answer("hu_norfolk_symptoms_q18", "Always")];
        let err = NorfolkCalculator.calculate(&mut answers, &config("Norfolk", vec![])).unwrap_err();
        assert_eq!(err.to_string(), "questionId hu_norfolk_symptoms_q18 is invalid");
    }

    #[test]
    fn test_malformed_question_id_rejected() {
        let mut answers = vec![answer("norfolk_q18", "Always")];
        assert!(NorfolkCalculator.calculate(&mut answers, &config("Norfolk", vec![])).is_err());
    }
}
