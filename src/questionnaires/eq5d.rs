//! EQ-5D-5L: five dimension levels, the visual analogue scale and the
//! combined health state code.

use serde_json::Value;
use std::collections::HashMap;

use super::{insert_number, question_map, ScoreCalculator, Scores};
use crate::models::{ModuleConfig, QuestionnaireAnswer};
use crate::utils::error::AppResult;

const LEVELS: [&str; 6] = ["mobility", "selfCare", "usualActivities", "pain", "anxiety", "eqVas"];

/// Splits on commas that are not followed by whitespace, so labels such as
/// "Yes, sometimes" stay intact.
fn split_choices(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != ',' {
            continue;
        }
        let followed_by_space = chars.peek().map(|(_, next)| next.is_whitespace()).unwrap_or(false);
        if !followed_by_space {
            parts.push(&text[start..i]);
            start = i + 1;
        }
    }
    parts.push(&text[start..]);
    parts
}

fn option_weights(question: &Value) -> HashMap<&str, i64> {
    let mut weights = HashMap::new();
    let options = question.get("options").and_then(Value::as_array);
    for option in options.into_iter().flatten() {
        let Some(label) = option.get("label").and_then(Value::as_str) else {
            continue;
        };
        let weight = match option.get("value") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        if weight.is_none() {
            log::error!("Zeroing invalid weight for answer {}", label);
        }
        weights.insert(label, weight.unwrap_or(0));
    }
    weights
}

fn is_weighted_choice(question: &Value) -> bool {
    question.get("format").and_then(Value::as_str) == Some("TEXTCHOICE")
        && question
            .get("options")
            .and_then(|options| options.get(0))
            .map(|first| first.get("value").is_some())
            .unwrap_or(false)
}

pub struct Eq5dCalculator;

impl ScoreCalculator for Eq5dCalculator {
    fn calculate(&self, answers: &mut [QuestionnaireAnswer], config: &ModuleConfig) -> AppResult<Scores> {
        let questions = question_map(&config.config_body);
        if questions.is_empty() {
            log::warn!("⚠️  EQ-5D-5L config {:?} has no questions", config.id);
        }

        let mut scores = Scores::new();
        let mut total = 0.0;

        for (index, answer) in answers.iter_mut().take(LEVELS.len()).enumerate() {
            let question = questions.get(answer.question_id.as_str()).filter(|q| is_weighted_choice(q));

            let level_score = match question {
                Some(question) => {
                    let weights = option_weights(question);
                    let score: i64 = split_choices(answer.text())
                        .into_iter()
                        .filter_map(|choice| weights.get(choice))
                        .sum();
                    answer.answer_score = Some(score);
                    total += score as f64 * 10f64.powi(4 - index as i32);
                    score as f64
                }
                None => match answer.value.filter(|v| *v != 0.0) {
                    Some(value) => value,
                    None => answer.text().trim().parse::<i64>().map(|v| v as f64).unwrap_or_else(|_| {
                        log::warn!("⚠️  {} is not an integer in {}", answer.text(), answer.question_id);
                        0.0
                    }),
                },
            };
            insert_number(&mut scores, LEVELS[index], level_score);
        }

        let health_state = total as i64;
        if health_state != 0 {
            scores.insert("healthState".to_string(), Value::from(health_state));
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questionnaires::test_support::{answer, config};
    use serde_json::json;

    fn level_question(id: &str) -> Value {
        let options: Vec<Value> = (1..=5)
            .map(|level| json!({ "label": format!("Level {}", level), "value": level.to_string() }))
            .collect();
        json!({ "id": id, "format": "TEXTCHOICE", "options": options })
    }

    #[test]
    fn test_health_state_and_vas() {
        let ids = ["eq_mobility", "eq_self_care", "eq_activities", "eq_pain", "eq_anxiety"];
        let mut questions: Vec<Value> = ids.iter().map(|id| level_question(id)).collect();
        questions.push(json!({ "id": "eq_vas", "format": "SCALE" }));
        let config = config("EQ5D5L", questions);

        let mut answers = vec![
            answer("eq_mobility", "Level 1"),
            answer("eq_self_care", "Level 2"),
            answer("eq_activities", "Level 3"),
            answer("eq_pain", "Level 4"),
            answer("eq_anxiety", "Level 5"),
            answer("eq_vas", "85"),
        ];

        let scores = Eq5dCalculator.calculate(&mut answers, &config).unwrap();

        assert_eq!(scores["healthState"], 12345);
        assert_eq!(scores["mobility"], 1.0);
        assert_eq!(scores["anxiety"], 5.0);
        assert_eq!(scores["eqVas"], 85.0);
        assert_eq!(answers[3].answer_score, Some(4));
        assert_eq!(answers[5].answer_score, None);
    }

    #[test]
    fn test_invalid_option_value_counts_zero() {
        let question = json!({
            "id": "q",
            "format": "TEXTCHOICE",
            "options": [{ "label": "A", "value": "" }, { "label": "B", "value": 2 }]
        });
        let weights = option_weights(&question);
        assert_eq!(weights["A"], 0);
        assert_eq!(weights["B"], 2);
    }

    #[test]
    fn test_split_choices_keeps_labels_with_spaced_commas() {
        assert_eq!(split_choices("A,B"), vec!["A", "B"]);
        assert_eq!(split_choices("Yes, sometimes,No"), vec!["Yes, sometimes", "No"]);
        assert_eq!(split_choices("Only"), vec!["Only"]);
    }

    #[test]
    fn test_no_weighted_answers_omits_health_state() {
        let mut answers = vec![answer("free", "3")];
        let scores = Eq5dCalculator.calculate(&mut answers, &config("EQ5D5L", vec![])).unwrap();

        assert_eq!(scores["mobility"], 3.0);
        assert!(!scores.contains_key("healthState"));
    }
}
