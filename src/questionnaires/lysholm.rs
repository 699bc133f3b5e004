//! Lysholm knee scoring scale.

use super::{insert_number, option_weight, question_map, ScoreCalculator, Scores};
use crate::models::{ModuleConfig, QuestionnaireAnswer};
use crate::utils::error::{AppError, AppResult};

const SECTIONS: [&str; 8] = [
    "limp",
    "support",
    "locking",
    "instability",
    "pain",
    "swelling",
    "stairs",
    "squatting",
];

const MAX_SCORE: f64 = 100.0;

pub struct LysholmCalculator;

impl ScoreCalculator for LysholmCalculator {
    fn calculate(&self, answers: &mut [QuestionnaireAnswer], config: &ModuleConfig) -> AppResult<Scores> {
        let questions = question_map(&config.config_body);
        let mut scores = Scores::new();
        let mut total = 0.0;

        for section in SECTIONS {
            let question_id = format!("lysholm_{}", section);
            let answer = answers
                .iter_mut()
                .find(|a| a.question_id == question_id)
                .ok_or_else(|| {
                    AppError::NotAllRequiredQuestionsAnswered(format!("{} is required", question_id))
                })?;
            let question = questions
                .get(question_id.as_str())
                .ok_or_else(|| AppError::invalid_request(format!("questionId {} is invalid", question_id)))?;

            let weight = option_weight(question, answer)?;
            answer.answer_score = Some(weight as i64);
            total += weight;
            insert_number(&mut scores, section, weight);
        }

        if !(0.0..=MAX_SCORE).contains(&total) {
            return Err(AppError::invalid_request(format!("Lysholm score {} is out of range", total)));
        }
        insert_number(&mut scores, "lysholm", total);
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questionnaires::test_support::{answer, choice_question, config};

    const SECTION_MAX: [f64; 8] = [5.0, 5.0, 15.0, 25.0, 25.0, 10.0, 10.0, 5.0];

    fn lysholm_config() -> ModuleConfig {
        let questions = SECTIONS
            .iter()
            .zip(SECTION_MAX)
            .map(|(section, max)| {
                choice_question(&format!("lysholm_{}", section), &[("None", max), ("Severe", 0.0)])
            })
            .collect();
        config("Lysholm", questions)
    }

    #[test]
    fn test_perfect_knee() {
        let mut answers: Vec<_> = SECTIONS.iter().map(|s| answer(&format!("lysholm_{}", s), "None")).collect();
        let scores = LysholmCalculator.calculate(&mut answers, &lysholm_config()).unwrap();

        assert_eq!(scores["lysholm"], 100.0);
        assert_eq!(scores["instability"], 25.0);
        assert!(answers.iter().all(|a| a.answer_score.is_some()));
    }

    #[test]
    fn test_partial_scores() {
        let mut answers: Vec<_> = SECTIONS
            .iter()
            .enumerate()
            .map(|(i, s)| answer(&format!("lysholm_{}", s), if i < 4 { "Severe" } else { "None" }))
            .collect();
        let scores = LysholmCalculator.calculate(&mut answers, &lysholm_config()).unwrap();

        assert_eq!(scores["lysholm"], 50.0);
        assert_eq!(scores["limp"], 0.0);
    }

    #[test]
    fn test_missing_section() {
        let mut answers: Vec<_> = SECTIONS[1..].iter().map(|s| answer(&format!("lysholm_{}", s), "None")).collect();
        let err = LysholmCalculator.calculate(&mut answers, &lysholm_config()).unwrap_err();

        assert!(matches!(err, AppError::NotAllRequiredQuestionsAnswered(_)));
    }
}
