//! Kansas City Cardiomyopathy Questionnaire.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use super::{insert_number, option_weight, question_map, as_number, ScoreCalculator, Scores};
use crate::models::{ModuleConfig, QuestionnaireAnswer};
use crate::utils::error::{AppError, AppResult};

lazy_static! {
    static ref QUESTION_ID: Regex =
        Regex::new(r"^kccq_(?P<subscale>.*?)_q(?P<number>\d+)(?P<sub>[a-z])*$").expect("valid regex");
}

const PHYSICAL_LIMITATION: &str = "physical_limitation";
const SYMPTOM_STABILITY: &str = "symptom_stability";
const SYMPTOM_FREQUENCY: &str = "symptom_frequency";
const SYMPTOM_BURDEN: &str = "symptom_burden";
const SELF_EFFICACY: &str = "self_efficacy";
const QUALITY_OF_LIFE: &str = "quality_of_life";
const SOCIAL_LIMITATION: &str = "social_limitation";

const MIN_ANSWERS: [(&str, usize); 7] = [
    (PHYSICAL_LIMITATION, 4),
    (SYMPTOM_STABILITY, 1),
    (SYMPTOM_FREQUENCY, 2),
    (SYMPTOM_BURDEN, 2),
    (SELF_EFFICACY, 1),
    (QUALITY_OF_LIFE, 2),
    (SOCIAL_LIMITATION, 3),
];

/// Question number and its maximum weight within the symptom frequency subscale.
const FREQUENCY_RANGES: [(u32, f64); 4] = [(3, 4.0), (5, 6.0), (7, 6.0), (9, 4.0)];

struct WeightedAnswer {
    number: u32,
    weight: f64,
}

pub struct KccqCalculator;

impl KccqCalculator {
    fn partition(
        answers: &[QuestionnaireAnswer],
        config: &ModuleConfig,
    ) -> AppResult<HashMap<String, Vec<WeightedAnswer>>> {
        let questions = question_map(&config.config_body);
        let mut partitioned: HashMap<String, Vec<WeightedAnswer>> = HashMap::new();

        for answer in answers {
            let captures = QUESTION_ID.captures(&answer.question_id).ok_or_else(|| {
                AppError::invalid_request(
                    "Wrong answer questionId it should be kccq_subscale_questionNumber[questionSubNumber]",
                )
            })?;
            let Some(question) = questions.get(answer.question_id.as_str()) else {
                continue;
            };

            let weight = option_weight(question, answer)?;
            let skip_by_weight = question.get("skipByWeight").and_then(as_number);
            if skip_by_weight == Some(weight) {
                continue;
            }

            let number = captures["number"]
                .parse()
                .map_err(|_| AppError::invalid_request("Invalid question number"))?;
            partitioned
                .entry(captures["subscale"].to_string())
                .or_default()
                .push(WeightedAnswer { number, weight });
        }

        for (subscale, min) in MIN_ANSWERS {
            let answered = partitioned.get(subscale).map(Vec::len).unwrap_or(0);
            if answered < min {
                return Err(AppError::NotAllRequiredQuestionsAnswered(format!(
                    "Answered only {} for {}. Min {} answers are required.",
                    answered, subscale, min
                )));
            }
        }

        Ok(partitioned)
    }
}

fn subscale_score(answers: &[WeightedAnswer]) -> f64 {
    let mean = answers.iter().map(|a| a.weight).sum::<f64>() / answers.len() as f64;
    100.0 * (mean - 1.0) / 4.0
}

fn frequency_score(answers: &[WeightedAnswer]) -> f64 {
    let normalized: Vec<f64> = FREQUENCY_RANGES
        .iter()
        .filter_map(|(number, range)| {
            answers
                .iter()
                .find(|a| a.number == *number)
                .map(|a| (a.weight - 1.0) / range)
        })
        .collect();

    if normalized.is_empty() {
        return 0.0;
    }
    100.0 * normalized.iter().sum::<f64>() / normalized.len() as f64
}

impl ScoreCalculator for KccqCalculator {
    fn calculate(&self, answers: &mut [QuestionnaireAnswer], config: &ModuleConfig) -> AppResult<Scores> {
        let partitioned = Self::partition(answers, config)?;
        let score = |subscale: &str| partitioned.get(subscale).map(|a| subscale_score(a)).unwrap_or(0.0);

        let physical_limitation = score(PHYSICAL_LIMITATION);
        let symptom_frequency = partitioned
            .get(SYMPTOM_FREQUENCY)
            .map(|a| frequency_score(a))
            .unwrap_or(0.0);
        let symptom_burden = score(SYMPTOM_BURDEN);
        let total_symptom = (symptom_frequency + symptom_burden) / 2.0;
        let quality_of_life = score(QUALITY_OF_LIFE);
        let social_limitation = score(SOCIAL_LIMITATION);

        let mut scores = Scores::new();
        insert_number(&mut scores, "physicalLimitation", physical_limitation);
        insert_number(&mut scores, "symptomStability", score(SYMPTOM_STABILITY));
        insert_number(&mut scores, "symptomFrequency", symptom_frequency);
        insert_number(&mut scores, "symptomBurden", symptom_burden);
        insert_number(&mut scores, "totalSymptomScore", total_symptom);
        insert_number(&mut scores, "selfEfficacy", score(SELF_EFFICACY));
        insert_number(&mut scores, "qualityOfLife", quality_of_life);
        insert_number(&mut scores, "socialLimitation", social_limitation);
        insert_number(
            &mut scores,
            "overallSummaryScore",
            (physical_limitation + total_symptom + quality_of_life + social_limitation) / 4.0,
        );
        insert_number(
            &mut scores,
            "clinicalSummaryScore",
            (physical_limitation + total_symptom) / 2.0,
        );
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questionnaires::test_support::{answer, choice_question, config};
    use serde_json::Value;

    fn question(id: &str, max: u32) -> Value {
        let labels: Vec<(String, f64)> = (1..=max).map(|w| (format!("w{}", w), w as f64)).collect();
        let refs: Vec<(&str, f64)> = labels.iter().map(|(l, w)| (l.as_str(), *w)).collect();
        choice_question(id, &refs)
    }

    fn full_submission() -> (ModuleConfig, Vec<QuestionnaireAnswer>) {
        let chosen: Vec<(&str, u32, u32)> = vec![
            ("kccq_physical_limitation_q1a", 6, 5),
            ("kccq_physical_limitation_q1b", 6, 5),
            ("kccq_physical_limitation_q1c", 6, 5),
            ("kccq_physical_limitation_q1d", 6, 5),
            ("kccq_symptom_stability_q2", 5, 3),
            ("kccq_symptom_frequency_q3", 5, 3),
            ("kccq_symptom_frequency_q5", 7, 4),
            ("kccq_symptom_burden_q4", 5, 2),
            ("kccq_symptom_burden_q6", 5, 4),
            ("kccq_self_efficacy_q10", 5, 5),
            ("kccq_quality_of_life_q12", 5, 1),
            ("kccq_quality_of_life_q13", 5, 1),
            ("kccq_social_limitation_q15a", 6, 3),
            ("kccq_social_limitation_q15b", 6, 3),
            ("kccq_social_limitation_q15c", 6, 3),
        ];

        let questions = chosen.iter().map(|(id, max, _)| question(id, *max)).collect();
        let answers = chosen
            .iter()
            .map(|(id, _, weight)| answer(id, &format!("w{}", weight)))
            .collect();
        (config("KCCQ", questions), answers)
    }

    #[test]
    fn test_scores_for_complete_submission() {
        let (config, mut answers) = full_submission();
        let scores = KccqCalculator.calculate(&mut answers, &config).unwrap();

        assert_eq!(scores["physicalLimitation"], 100.0);
        assert_eq!(scores["symptomStability"], 50.0);
        assert_eq!(scores["symptomFrequency"], 50.0);
        assert_eq!(scores["symptomBurden"], 50.0);
        assert_eq!(scores["totalSymptomScore"], 50.0);
        assert_eq!(scores["selfEfficacy"], 100.0);
        assert_eq!(scores["qualityOfLife"], 0.0);
        assert_eq!(scores["socialLimitation"], 50.0);
        assert_eq!(scores["overallSummaryScore"], 50.0);
        assert_eq!(scores["clinicalSummaryScore"], 75.0);
    }

    #[test]
    fn test_skip_by_weight_counts_as_unanswered() {
        let (mut config, mut answers) = full_submission();
        let pages = config.config_body["pages"][0]["items"].as_array_mut().unwrap();
        for item in pages.iter_mut().filter(|q| q["id"] == "kccq_physical_limitation_q1a") {
            item["skipByWeight"] = Value::from(5);
        }

        let err = KccqCalculator.calculate(&mut answers, &config).unwrap_err();
        assert!(matches!(err, AppError::NotAllRequiredQuestionsAnswered(_)));
    }

    #[test]
    fn test_missing_subscale_answers_rejected() {
        let (config, mut answers) = full_submission();
        answers.retain(|a| !a.question_id.starts_with("kccq_social"));

        let err = KccqCalculator.calculate(&mut answers, &config).unwrap_err();
        assert!(err.to_string().contains("social_limitation"));
    }

    #[test]
    fn test_malformed_question_id_rejected() {
        let (config, mut answers) = full_submission();
        answers.push(answer("physical_q1", "w1"));

        let err = KccqCalculator.calculate(&mut answers, &config).unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[test]
    fn test_unknown_option_rejected() {
        let (config, mut answers) = full_submission();
        answers[0].answer_text = Some("not an option".to_string());

        assert!(KccqCalculator.calculate(&mut answers, &config).is_err());
    }
}
