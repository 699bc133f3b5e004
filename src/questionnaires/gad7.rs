//! Generalised Anxiety Disorder 7 item scale.

use serde_json::Value;

use super::{answer_number, question_map, ScoreCalculator, Scores};
use crate::models::{ModuleConfig, QuestionnaireAnswer};
use crate::utils::error::{AppError, AppResult};

const ITEM_COUNT: usize = 7;
const MAX_ITEM_SCORE: i64 = 3;

pub fn severity(total: i64) -> &'static str {
    match total {
        t if t < 5 => "minimal",
        t if t < 10 => "mild",
        t if t < 15 => "moderate",
        _ => "severe",
    }
}

pub struct Gad7Calculator;

impl ScoreCalculator for Gad7Calculator {
    fn calculate(&self, answers: &mut [QuestionnaireAnswer], config: &ModuleConfig) -> AppResult<Scores> {
        if answers.len() < ITEM_COUNT {
            return Err(AppError::NotAllRequiredQuestionsAnswered(format!(
                "Answered only {} of {} questions",
                answers.len(),
                ITEM_COUNT
            )));
        }

        let questions = question_map(&config.config_body);
        let mut total = 0;
        for answer in answers.iter_mut().take(ITEM_COUNT) {
            let score = answer_number(answer, &questions)?.round() as i64;
            if !(0..=MAX_ITEM_SCORE).contains(&score) {
                return Err(AppError::invalid_request(format!(
                    "Answer to {} must score between 0 and {}",
                    answer.question_id, MAX_ITEM_SCORE
                )));
            }
            answer.answer_score = Some(score);
            total += score;
        }

        let mut scores = Scores::new();
        scores.insert("gad7Total".to_string(), Value::from(total));
        scores.insert("severity".to_string(), Value::from(severity(total)));
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questionnaires::test_support::{answer, choice_question, config};

    const LABELS: [(&str, f64); 4] = [
        ("Not at all", 0.0),
        ("Several days", 1.0),
        ("More than half the days", 2.0),
        ("Nearly every day", 3.0),
    ];

    fn gad7_config() -> ModuleConfig {
        config(
            "GAD7",
            (1..=7).map(|n| choice_question(&format!("gad7_q{}", n), &LABELS)).collect(),
        )
    }

    #[test]
    fn test_total_and_severity() {
        let mut answers: Vec<_> = (1..=7)
            .map(|n| answer(&format!("gad7_q{}", n), if n <= 4 { "Nearly every day" } else { "Several days" }))
            .collect();
        let scores = Gad7Calculator.calculate(&mut answers, &gad7_config()).unwrap();

        assert_eq!(scores["gad7Total"], 15);
        assert_eq!(scores["severity"], "severe");
        assert_eq!(answers[0].answer_score, Some(3));
    }

    #[test]
    fn test_severity_bands() {
        assert_eq!(severity(0), "minimal");
        assert_eq!(severity(4), "minimal");
        assert_eq!(severity(5), "mild");
        assert_eq!(severity(10), "moderate");
        assert_eq!(severity(14), "moderate");
        assert_eq!(severity(21), "severe");
    }

    #[test]
    fn test_requires_all_items() {
        let mut answers = vec![answer("gad7_q1", "Not at all"); 6];
        let err = Gad7Calculator.calculate(&mut answers, &gad7_config()).unwrap_err();
        assert!(matches!(err, AppError::NotAllRequiredQuestionsAnswered(_)));
    }

    #[test]
    fn test_item_out_of_range() {
        let mut answers: Vec<_> = (1..=7).map(|n| answer(&format!("gad7_q{}", n), "Not at all")).collect();
        answers[2].value = Some(4.0);
        assert!(matches!(
            Gad7Calculator.calculate(&mut answers, &gad7_config()),
            Err(AppError::InvalidRequest(_))
        ));
    }
}
