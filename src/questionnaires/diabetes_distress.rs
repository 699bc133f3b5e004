//! Diabetes Distress Scale, both the two item screener and the full 17 item form.

use super::{insert_number, round2, ScoreCalculator, Scores};
use crate::models::{ModuleConfig, QuestionnaireAnswer};
use crate::utils::error::{AppError, AppResult};

const EMOTIONAL_BURDEN: [usize; 5] = [1, 3, 8, 11, 14];
const PHYSICIAN_DISTRESS: [usize; 4] = [2, 4, 9, 15];
const REGIMEN_DISTRESS: [usize; 5] = [5, 6, 10, 12, 16];
const INTERPERSONAL_DISTRESS: [usize; 3] = [7, 13, 17];

/// Screening questions that precede the 17 scored items.
const SCREENING_QUESTIONS: usize = 2;

fn score_of(answer: &QuestionnaireAnswer) -> AppResult<f64> {
    let score = match answer.text() {
        "Not a problem" => 1.0,
        "A slight problem" => 2.0,
        "A moderate problem" => 3.0,
        "Somewhat serious problem" => 4.0,
        "A serious problem" => 5.0,
        "A very serious problem" => 6.0,
        other => {
            return Err(AppError::invalid_request(format!(
                "Invalid answer \"{}\" for question \"{}\"",
                other, answer.question
            )))
        }
    };
    Ok(score)
}

pub struct DiabetesDistressCalculator;

impl DiabetesDistressCalculator {
    fn dds2(answers: &[QuestionnaireAnswer]) -> AppResult<Scores> {
        let mut total = 0.0;
        for answer in answers {
            total += score_of(answer)?;
        }

        let mut scores = Scores::new();
        insert_number(&mut scores, "totalDDS", round2(total / 2.0));
        Ok(scores)
    }

    fn dds17(answers: &[QuestionnaireAnswer]) -> AppResult<Scores> {
        let mut item_scores = Vec::with_capacity(17);
        for answer in &answers[SCREENING_QUESTIONS..] {
            item_scores.push(score_of(answer)?);
        }

        // items are numbered from 1
        let mean_of = |items: &[usize]| {
            let sum: f64 = items.iter().map(|i| item_scores[i - 1]).sum();
            round2(sum / items.len() as f64)
        };
        let total: f64 = item_scores.iter().sum();

        let mut scores = Scores::new();
        insert_number(&mut scores, "totalDDS", round2(total / 17.0));
        insert_number(&mut scores, "emotionalBurden", mean_of(&EMOTIONAL_BURDEN));
        insert_number(&mut scores, "physicianDistress", mean_of(&PHYSICIAN_DISTRESS));
        insert_number(&mut scores, "regimenDistress", mean_of(&REGIMEN_DISTRESS));
        insert_number(&mut scores, "interpersonalDistress", mean_of(&INTERPERSONAL_DISTRESS));
        Ok(scores)
    }
}

impl ScoreCalculator for DiabetesDistressCalculator {
    fn calculate(&self, answers: &mut [QuestionnaireAnswer], _config: &ModuleConfig) -> AppResult<Scores> {
        match answers.len() {
            2 => Self::dds2(answers),
            19 => Self::dds17(answers),
            _ => Err(AppError::invalid_request("Incorrect amount of answers")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questionnaires::test_support::{answer, config};

    const LABELS: [&str; 6] = [
        "Not a problem",
        "A slight problem",
        "A moderate problem",
        "Somewhat serious problem",
        "A serious problem",
        "A very serious problem",
    ];

    #[test]
    fn test_dds2() {
        let mut answers = vec![answer("dds_1", LABELS[1]), answer("dds_2", LABELS[2])];
        let scores = DiabetesDistressCalculator
            .calculate(&mut answers, &config("DiabetesDistressScore", vec![]))
            .unwrap();

        assert_eq!(scores["totalDDS"], 2.5);
        assert_eq!(scores.len(), 1);
    }

    #[test]
    fn test_dds17_subscales() {
        let mut answers = vec![answer("screen_1", LABELS[5]), answer("screen_2", LABELS[5])];
        // item n scores (n % 6) + 1
        for n in 1..=17 {
            answers.push(answer(&format!("dds_{}", n), LABELS[n % 6]));
        }

        let scores = DiabetesDistressCalculator
            .calculate(&mut answers, &config("DiabetesDistressScore", vec![]))
            .unwrap();

        // 2+3+4+5+6+1 twice plus 2+3+4+5+6
        assert_eq!(scores["totalDDS"], round2(62.0 / 17.0));
        // items 1,3,8,11,14 -> 2,4,3,6,3
        assert_eq!(scores["emotionalBurden"], 3.6);
        // items 2,4,9,15 -> 3,5,4,4
        assert_eq!(scores["physicianDistress"], 4.0);
        // items 5,6,10,12,16 -> 6,1,5,1,5
        assert_eq!(scores["regimenDistress"], 3.6);
        // items 7,13,17 -> 2,2,6
        assert_eq!(scores["interpersonalDistress"], 3.33);
    }

    #[test]
    fn test_wrong_answer_count() {
        let mut answers = vec![answer("dds_1", LABELS[0]); 5];
        let err = DiabetesDistressCalculator
            .calculate(&mut answers, &config("DiabetesDistressScore", vec![]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Incorrect amount of answers");
    }

    #[test]
    fn test_unknown_label() {
        let mut answers = vec![answer("dds_1", LABELS[0]), answer("dds_2", "Terrible")];
        assert!(DiabetesDistressCalculator
            .calculate(&mut answers, &config("DiabetesDistressScore", vec![]))
            .is_err());
    }
}
