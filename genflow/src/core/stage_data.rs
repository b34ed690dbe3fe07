//! Per-stage data recorded by the state machine.

use serde::{Deserialize, Serialize};
use std::ops::Add;

use super::StageStatus;

/// Token usage reported for a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens.
    #[serde(default)]
    pub prompt: u64,
    /// Completion tokens.
    #[serde(default)]
    pub completion: u64,
    /// Total tokens.
    #[serde(default)]
    pub total: u64,
}

impl TokenUsage {
    /// Creates a token usage record.
    #[must_use]
    pub const fn new(prompt: u64, completion: u64, total: u64) -> Self {
        Self {
            prompt,
            completion,
            total,
        }
    }
}

impl Add for TokenUsage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            prompt: self.prompt + rhs.prompt,
            completion: self.completion + rhs.completion,
            total: self.total + rhs.total,
        }
    }
}

/// Typed structured output of a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StructuredFields {
    /// Output of the classification stage.
    Classification {
        /// The classified role.
        #[serde(rename = "roleClassification")]
        role_classification: String,
        /// Focus points extracted from the source document.
        #[serde(rename = "focusPoints", default)]
        focus_points: Vec<String>,
        /// Keywords extracted from the source document.
        #[serde(default)]
        keywords: Vec<String>,
        /// Key sentences extracted from the source document.
        #[serde(rename = "keySentences", default)]
        key_sentences: Vec<String>,
    },
    /// Output of the profile and review stages.
    Profile {
        /// The tailored profile document.
        #[serde(rename = "profileJson")]
        profile_json: serde_json::Value,
    },
}

impl StructuredFields {
    /// Returns the role classification, if this is a classification output.
    #[must_use]
    pub fn role_classification(&self) -> Option<&str> {
        match self {
            Self::Classification {
                role_classification,
                ..
            } => Some(role_classification),
            Self::Profile { .. } => None,
        }
    }

    /// Returns the profile document, if this is a profile output.
    #[must_use]
    pub const fn profile_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Profile { profile_json } => Some(profile_json),
            Self::Classification { .. } => None,
        }
    }
}

/// Fields merged into a stage when it completes.
///
/// `None` fields leave the existing value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageFields {
    /// Text content produced by the stage.
    pub content: Option<String>,
    /// Typed structured output.
    pub structured: Option<StructuredFields>,
    /// Token usage.
    pub tokens: Option<TokenUsage>,
    /// Stage duration in milliseconds.
    pub duration_ms: Option<f64>,
}

impl StageFields {
    /// Creates empty fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Sets the structured output.
    #[must_use]
    pub fn with_structured(mut self, structured: StructuredFields) -> Self {
        self.structured = Some(structured);
        self
    }

    /// Sets the token usage.
    #[must_use]
    pub const fn with_tokens(mut self, tokens: TokenUsage) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Sets the duration.
    #[must_use]
    pub const fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Returns true if no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.structured.is_none()
            && self.tokens.is_none()
            && self.duration_ms.is_none()
    }
}

/// Everything recorded about one stage during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageData {
    /// Current status.
    pub status: StageStatus,
    /// Final text content, or the error message when failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Typed structured output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_fields: Option<StructuredFields>,
    /// Token usage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenUsage>,
    /// Stage duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    /// Partial output accumulated while the stage is in progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming_content: Option<String>,
}

impl StageData {
    /// Creates a pending stage.
    #[must_use]
    pub fn pending() -> Self {
        Self::default()
    }

    /// Creates a completed stage from fields.
    #[must_use]
    pub fn completed(fields: StageFields) -> Self {
        let mut data = Self {
            status: StageStatus::Completed,
            ..Self::default()
        };
        data.merge(fields);
        data
    }

    /// Merges fields into this stage, keeping existing values for unset fields.
    pub fn merge(&mut self, fields: StageFields) {
        if let Some(content) = fields.content {
            self.content = Some(content);
        }
        if let Some(structured) = fields.structured {
            self.structured_fields = Some(structured);
        }
        if let Some(tokens) = fields.tokens {
            self.tokens = Some(tokens);
        }
        if let Some(duration_ms) = fields.duration_ms {
            self.duration_ms = Some(duration_ms);
        }
    }

    /// Returns the role classification recorded on this stage, if any.
    #[must_use]
    pub fn role_classification(&self) -> Option<&str> {
        self.structured_fields
            .as_ref()
            .and_then(StructuredFields::role_classification)
    }

    /// Returns the profile document recorded on this stage, if any.
    #[must_use]
    pub fn profile_json(&self) -> Option<&serde_json::Value> {
        self.structured_fields
            .as_ref()
            .and_then(StructuredFields::profile_json)
    }

    /// Returns the recorded data as fields, for re-applying elsewhere.
    #[must_use]
    pub fn to_fields(&self) -> StageFields {
        StageFields {
            content: self.content.clone(),
            structured: self.structured_fields.clone(),
            tokens: self.tokens,
            duration_ms: self.duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_token_usage_add() {
        let sum = TokenUsage::new(10, 5, 15) + TokenUsage::new(1, 2, 3);
        assert_eq!(sum, TokenUsage::new(11, 7, 18));
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let mut data = StageData::completed(
            StageFields::new()
                .with_content("draft")
                .with_tokens(TokenUsage::new(1, 1, 2)),
        );
        data.merge(StageFields::new().with_duration_ms(120.0));

        assert_eq!(data.content.as_deref(), Some("draft"));
        assert_eq!(data.tokens, Some(TokenUsage::new(1, 1, 2)));
        assert_eq!(data.duration_ms, Some(120.0));
    }

    #[test]
    fn test_role_classification_accessor() {
        let data = StageData::completed(StageFields::new().with_structured(
            StructuredFields::Classification {
                role_classification: "Backend Engineer".to_string(),
                focus_points: vec![],
                keywords: vec!["Go".to_string()],
                key_sentences: vec![],
            },
        ));
        assert_eq!(data.role_classification(), Some("Backend Engineer"));
        assert!(data.profile_json().is_none());
    }

    #[test]
    fn test_stage_data_serializes_camel_case() {
        let data = StageData::completed(StageFields::new().with_duration_ms(5.0));
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["durationMs"], 5.0);
        assert!(json.get("content").is_none());
    }
}
