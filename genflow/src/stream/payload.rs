//! Tolerant extraction of stage outputs from event and response bodies.
//!
//! The backend has shipped both camelCase and snake_case field names (and a
//! few legacy aliases) for the same logical field. Every lookup takes an
//! ordered list of names; the first present, non-null one wins.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::core::{StageFields, StageKey, StructuredFields, TokenUsage};

const ROLE_FIELDS: &[&str] = &[
    "roleClassification",
    "role_classification",
    "roleType",
    "role_type",
];
const FOCUS_FIELDS: &[&str] = &["focusPoints", "focus_points", "insights"];
const KEYWORD_FIELDS: &[&str] = &["keywords", "key_words"];
const KEY_SENTENCE_FIELDS: &[&str] = &["keySentences", "key_sentences"];
const EXPERIENCE_FIELDS: &[&str] = &["workExperience", "work_experience", "content"];
const PROFILE_FIELDS: &[&str] = &["personalInfo", "personal_info", "profileJson", "profile_json"];
const REVIEW_TEXT_FIELDS: &[&str] = &[
    "workExperience",
    "work_experience",
    "finalExperienceText",
    "final_experience_text",
    "content",
];
const FINAL_TEXT_FIELDS: &[&str] = &[
    "finalExperienceText",
    "final_experience_text",
    "workExperience",
    "work_experience",
];
const FINAL_RESULT_FIELDS: &[&str] = &["finalResult", "final_result", "final"];
const STEPS_FIELDS: &[&str] = &["steps", "stepDetails", "step_details"];
const TOKEN_FIELDS: &[&str] = &["tokens", "tokenUsage", "token_usage"];
const DURATION_FIELDS: &[&str] = &["durationMs", "duration_ms", "duration"];
const MESSAGE_FIELDS: &[&str] = &["message", "error", "details"];
const STAGE_FIELDS: &[&str] = &["stage", "step"];
const CHUNK_FIELDS: &[&str] = &["content", "streamingContent", "streaming_content", "chunk"];

/// Returns the first present, non-null field among `names`.
#[must_use]
pub fn pick<'a>(body: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| body.get(*name).filter(|v| !v.is_null()))
}

/// Returns the first string field among `names`.
#[must_use]
pub fn pick_str(body: &Value, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| body.get(*name).and_then(Value::as_str))
        .map(str::to_string)
}

/// Returns the first list-of-strings field among `names`.
///
/// Non-string elements are skipped; a bare string becomes a single element.
#[must_use]
pub fn pick_strings(body: &Value, names: &[&str]) -> Vec<String> {
    match pick(body, names) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Reads token usage, accepting either naming convention for each counter.
#[must_use]
pub fn pick_tokens(body: &Value) -> Option<TokenUsage> {
    let tokens = pick(body, TOKEN_FIELDS)?.as_object()?;
    let counter = |names: &[&str]| {
        names
            .iter()
            .find_map(|n| tokens.get(*n).and_then(Value::as_u64))
            .unwrap_or(0)
    };
    let prompt = counter(&["prompt", "prompt_tokens", "promptTokens"]);
    let completion = counter(&["completion", "completion_tokens", "completionTokens"]);
    let total = match counter(&["total", "total_tokens", "totalTokens"]) {
        0 => prompt + completion,
        t => t,
    };
    Some(TokenUsage::new(prompt, completion, total))
}

/// Reads the stage duration in milliseconds.
#[must_use]
pub fn pick_duration(body: &Value) -> Option<f64> {
    pick(body, DURATION_FIELDS).and_then(Value::as_f64)
}

/// Reads an error message from an `error` event or response body.
#[must_use]
pub fn error_message(body: &Value) -> String {
    if let Some(s) = body.as_str() {
        return s.to_string();
    }
    pick_str(body, MESSAGE_FIELDS)
        .or_else(|| {
            body.get("error")
                .and_then(|e| pick_str(e, &["message"]))
        })
        .unwrap_or_else(|| "unknown pipeline error".to_string())
}

/// Reads the stage named by a `chunk` event.
#[must_use]
pub fn chunk_stage(body: &Value) -> Option<StageKey> {
    pick_str(body, STAGE_FIELDS).and_then(|s| s.parse().ok())
}

/// Reads the partial content carried by a `chunk` event.
#[must_use]
pub fn chunk_content(body: &Value) -> Option<String> {
    pick_str(body, CHUNK_FIELDS)
}

/// Extracts the fields of one stage's result from an event body.
///
/// Bodies that nest the output under `result` are unwrapped; token usage and
/// duration may sit at either level.
#[must_use]
pub fn stage_fields(stage: StageKey, payload: &Value) -> StageFields {
    let body = payload
        .get("result")
        .filter(|v| v.is_object())
        .unwrap_or(payload);

    let mut fields = match stage {
        StageKey::Classification => classification_fields(body),
        StageKey::Experience => StageFields {
            content: pick_str(body, EXPERIENCE_FIELDS),
            ..StageFields::default()
        },
        StageKey::Profile => StageFields {
            content: pick_str(body, &["content"]),
            structured: profile_structured(body),
            ..StageFields::default()
        },
        StageKey::Review => StageFields {
            content: pick_str(body, REVIEW_TEXT_FIELDS),
            structured: profile_structured(body),
            ..StageFields::default()
        },
    };

    fields.tokens = pick_tokens(payload).or_else(|| pick_tokens(body));
    fields.duration_ms = pick_duration(payload).or_else(|| pick_duration(body));
    fields
}

fn classification_fields(body: &Value) -> StageFields {
    let role = pick_str(body, ROLE_FIELDS);
    let focus_points = pick_strings(body, FOCUS_FIELDS);
    let keywords = pick_strings(body, KEYWORD_FIELDS);
    let key_sentences = pick_strings(body, KEY_SENTENCE_FIELDS);

    let has_any = role.is_some()
        || !focus_points.is_empty()
        || !keywords.is_empty()
        || !key_sentences.is_empty();

    StageFields {
        content: pick_str(body, &["content"]).or_else(|| role.clone()),
        structured: has_any.then(|| StructuredFields::Classification {
            role_classification: role.unwrap_or_default(),
            focus_points,
            keywords,
            key_sentences,
        }),
        ..StageFields::default()
    }
}

fn profile_structured(body: &Value) -> Option<StructuredFields> {
    pick(body, PROFILE_FIELDS).map(|profile_json| StructuredFields::Profile {
        profile_json: profile_json.clone(),
    })
}

/// Reads a per-stage summary map (`steps`) from a body.
///
/// Keys are stage names (legacy names accepted); unknown keys are skipped.
#[must_use]
pub fn steps_summary(body: &Value) -> Option<BTreeMap<StageKey, StageFields>> {
    let steps = pick(body, STEPS_FIELDS)?.as_object()?;
    let mut summary = BTreeMap::new();
    for (name, step) in steps {
        match name.parse::<StageKey>() {
            Ok(key) => {
                summary.insert(key, stage_fields(key, step));
            }
            Err(e) => debug!(step = %name, error = %e, "Skipping unknown summary entry"),
        }
    }
    Some(summary)
}

/// The terminal payload of a stream (`done`) or a fallback response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionPayload {
    /// Final synthesized completion of the last stage.
    pub final_completion: Option<StageFields>,
    /// Explicit final experience text.
    pub final_experience_text: Option<String>,
    /// Explicit role classification.
    pub role_classification: Option<String>,
    /// Full per-stage summary map.
    pub steps: Option<BTreeMap<StageKey, StageFields>>,
}

impl CompletionPayload {
    /// Parses a terminal payload.
    #[must_use]
    pub fn parse(body: &Value) -> Self {
        let final_completion = pick(body, FINAL_RESULT_FIELDS)
            .filter(|v| v.is_object())
            .map(|v| stage_fields(StageKey::Review, v))
            .filter(|f| !f.is_empty());

        let final_experience_text = pick_str(body, FINAL_TEXT_FIELDS).or_else(|| {
            final_completion
                .as_ref()
                .and_then(|f| f.content.clone())
        });

        Self {
            final_completion,
            final_experience_text,
            role_classification: pick_str(body, ROLE_FIELDS),
            steps: steps_summary(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_pick_prefers_first_name() {
        let body = json!({"workExperience": "camel", "work_experience": "snake"});
        assert_eq!(pick_str(&body, EXPERIENCE_FIELDS).as_deref(), Some("camel"));

        let body = json!({"workExperience": null, "work_experience": "snake"});
        assert_eq!(pick_str(&body, EXPERIENCE_FIELDS).as_deref(), Some("snake"));
    }

    #[test]
    fn test_classification_fields_both_conventions() {
        let camel = stage_fields(
            StageKey::Classification,
            &json!({"roleClassification": "Backend Engineer", "keywords": ["Go", "gRPC"], "focusPoints": ["APIs"]}),
        );
        let snake = stage_fields(
            StageKey::Classification,
            &json!({"role_classification": "Backend Engineer", "keywords": ["Go", "gRPC"], "focus_points": ["APIs"]}),
        );
        assert_eq!(camel, snake);
        assert_eq!(
            camel.structured,
            Some(StructuredFields::Classification {
                role_classification: "Backend Engineer".to_string(),
                focus_points: vec!["APIs".to_string()],
                keywords: vec!["Go".to_string(), "gRPC".to_string()],
                key_sentences: vec![],
            })
        );
    }

    #[test]
    fn test_nested_result_and_outer_tokens() {
        let fields = stage_fields(
            StageKey::Experience,
            &json!({
                "result": {"workExperience": "Built things"},
                "tokens": {"prompt_tokens": 10, "completion_tokens": 5},
                "duration": 1200
            }),
        );
        assert_eq!(fields.content.as_deref(), Some("Built things"));
        assert_eq!(fields.tokens, Some(TokenUsage::new(10, 5, 15)));
        assert_eq!(fields.duration_ms, Some(1200.0));
    }

    #[test]
    fn test_profile_fields() {
        let fields = stage_fields(
            StageKey::Profile,
            &json!({"personal_info": {"fullName": "Ada"}}),
        );
        assert_eq!(
            fields.structured,
            Some(StructuredFields::Profile {
                profile_json: json!({"fullName": "Ada"})
            })
        );
    }

    #[test]
    fn test_steps_summary_accepts_legacy_names() {
        let summary = steps_summary(&json!({
            "steps": {
                "classifier": {"roleType": "SRE"},
                "reviewer": {"workExperience": "final"},
                "bogus": {}
            }
        }))
        .unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(
            summary[&StageKey::Review].content.as_deref(),
            Some("final")
        );
    }

    #[test]
    fn test_completion_payload() {
        let payload = CompletionPayload::parse(&json!({
            "finalResult": {"workExperience": "final text", "personalInfo": {"fullName": "Ada"}},
            "roleClassification": "Backend Engineer"
        }));
        assert_eq!(payload.final_experience_text.as_deref(), Some("final text"));
        assert_eq!(payload.role_classification.as_deref(), Some("Backend Engineer"));
        assert!(payload.steps.is_none());
        assert!(payload.final_completion.is_some());
    }

    #[test]
    fn test_error_message_variants() {
        assert_eq!(error_message(&json!({"message": "rate limited"})), "rate limited");
        assert_eq!(error_message(&json!({"error": "boom"})), "boom");
        assert_eq!(error_message(&json!({"error": {"message": "nested"}})), "nested");
        assert_eq!(error_message(&json!("plain")), "plain");
        assert_eq!(error_message(&json!({})), "unknown pipeline error");
    }
}
