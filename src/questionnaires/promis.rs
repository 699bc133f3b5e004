//! PROMIS Global Health: mental and physical T-scores.

use std::collections::HashMap;

use super::{answer_number, insert_number, question_map, ScoreCalculator, Scores};
use crate::models::{ModuleConfig, QuestionnaireAnswer};
use crate::utils::error::{AppError, AppResult};

/// Raw score 4..=20 to (T-score, standard error).
const MENTAL_T_SCORES: [(f64, f64); 17] = [
    (21.2, 4.6), (25.1, 4.1), (28.4, 3.9), (31.3, 3.7), (33.8, 3.7), (36.3, 3.7),
    (38.8, 3.6), (41.1, 3.6), (43.5, 3.6), (45.8, 3.6), (48.3, 3.7), (50.8, 3.7),
    (53.3, 3.7), (56.0, 3.8), (59.0, 3.9), (62.5, 4.2), (67.6, 5.3),
];

const PHYSICAL_T_SCORES: [(f64, f64); 17] = [
    (16.2, 4.8), (19.9, 4.7), (23.5, 4.5), (26.7, 4.3), (29.6, 4.2), (32.4, 4.2),
    (34.9, 4.1), (37.4, 4.1), (39.8, 4.1), (42.3, 4.2), (44.9, 4.3), (47.7, 4.4),
    (50.8, 4.6), (54.1, 4.7), (57.7, 4.9), (61.9, 5.2), (67.7, 5.9),
];

const MIN_RAW_SCORE: i64 = 4;

/// Pain rating 0..=10 recoded onto the 1..=5 scale.
const GLOBAL07_RECODE: [i64; 11] = [5, 4, 4, 4, 3, 3, 3, 2, 2, 2, 1];

const MENTAL_ITEMS: [&str; 4] = ["global02", "global04", "global05", "global10r"];
const PHYSICAL_ITEMS: [&str; 3] = ["global03", "global06", "global08r"];
const PAIN_ITEM: &str = "global07rc";

fn lookup(table: &[(f64, f64); 17], raw: i64, scale: &str) -> AppResult<(f64, f64)> {
    usize::try_from(raw - MIN_RAW_SCORE)
        .ok()
        .and_then(|index| table.get(index).copied())
        .ok_or_else(|| AppError::invalid_request(format!("{} raw score {} is out of range", scale, raw)))
}

pub struct PromisGlobalHealthCalculator;

impl PromisGlobalHealthCalculator {
    fn item_values(answers: &[QuestionnaireAnswer], config: &ModuleConfig) -> AppResult<HashMap<&'static str, i64>> {
        let questions = question_map(&config.config_body);
        let mut values = HashMap::new();

        for answer in answers {
            let item = MENTAL_ITEMS
                .iter()
                .chain(PHYSICAL_ITEMS.iter())
                .copied()
                .chain(std::iter::once(PAIN_ITEM))
                .find(|item| answer.question_id.ends_with(item));
            if let Some(item) = item {
                values.insert(item, answer_number(answer, &questions)?.round() as i64);
            }
        }
        Ok(values)
    }
}

impl ScoreCalculator for PromisGlobalHealthCalculator {
    fn calculate(&self, answers: &mut [QuestionnaireAnswer], config: &ModuleConfig) -> AppResult<Scores> {
        let values = Self::item_values(answers, config)?;
        let item = |name: &str| {
            values.get(name).copied().ok_or_else(|| {
                AppError::NotAllRequiredQuestionsAnswered(format!("{} is required", name))
            })
        };

        let pain = item(PAIN_ITEM)?;
        let global07rc = usize::try_from(pain)
            .ok()
            .and_then(|index| GLOBAL07_RECODE.get(index).copied())
            .ok_or_else(|| AppError::invalid_request(format!("{} must be between 0 and 10", PAIN_ITEM)))?;

        let mut mental_raw = 0;
        for name in MENTAL_ITEMS {
            mental_raw += item(name)?;
        }
        let mut physical_raw = global07rc;
        for name in PHYSICAL_ITEMS {
            physical_raw += item(name)?;
        }

        let (mental_value, mental_error) = lookup(&MENTAL_T_SCORES, mental_raw, "Mental health")?;
        let (physical_value, physical_error) = lookup(&PHYSICAL_T_SCORES, physical_raw, "Physical health")?;

        let mut scores = Scores::new();
        scores.insert("global07rc".to_string(), global07rc.into());
        scores.insert("mentalHealthRaw".to_string(), mental_raw.into());
        insert_number(&mut scores, "mentalHealthValue", mental_value);
        insert_number(&mut scores, "mentalHealthError", mental_error);
        scores.insert("physicalHealthRaw".to_string(), physical_raw.into());
        insert_number(&mut scores, "physicalHealthValue", physical_value);
        insert_number(&mut scores, "physicalHealthError", physical_error);
        Ok(scores)
    }
}
