//! Workflow trigger, request and result types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{StageData, StageKey, TokenUsage};
use crate::errors::GenflowError;

/// Stage data for all four stages, iterated in pipeline order.
pub type StageMap = BTreeMap<StageKey, StageData>;

/// Profile field holding the person's display name.
pub const PROFILE_NAME_FIELD: &str = "fullName";
/// Profile field holding the contact email.
pub const PROFILE_EMAIL_FIELD: &str = "email";
/// Profile field holding the preferred document format.
pub const PROFILE_FORMAT_FIELD: &str = "format";

/// The user-triggered input of one generation run.
///
/// The referenced work item and profile are owned by external record stores;
/// this type only carries the values needed for generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerInput {
    /// Identifier of the work item (job description) being tailored for.
    pub target_id: String,
    /// Owner of the work item, if known.
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Role title of the work item.
    pub title: String,
    /// Organization of the work item.
    pub organization: String,
    /// Full source document text.
    pub source_document: String,
    /// The candidate profile.
    pub profile_data: serde_json::Value,
}

impl TriggerInput {
    /// Creates a new trigger input.
    #[must_use]
    pub fn new(
        target_id: impl Into<String>,
        title: impl Into<String>,
        organization: impl Into<String>,
        source_document: impl Into<String>,
        profile_data: serde_json::Value,
    ) -> Self {
        Self {
            target_id: target_id.into(),
            owner_id: None,
            title: title.into(),
            organization: organization.into(),
            source_document: source_document.into(),
            profile_data,
        }
    }

    /// Sets the owner id.
    #[must_use]
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    /// Checks that the trigger carries what a run needs.
    ///
    /// The profile must have a non-empty name and email.
    pub fn validate(&self) -> Result<(), GenflowError> {
        if self.target_id.trim().is_empty() {
            return Err(GenflowError::Precondition("missing work item id".to_string()));
        }
        if self.source_document.trim().is_empty() {
            return Err(GenflowError::Precondition(
                "missing source document".to_string(),
            ));
        }
        for field in [PROFILE_NAME_FIELD, PROFILE_EMAIL_FIELD] {
            let present = self
                .profile_data
                .get(field)
                .and_then(serde_json::Value::as_str)
                .is_some_and(|v| !v.trim().is_empty());
            if !present {
                return Err(GenflowError::Precondition(format!(
                    "profile is missing required field '{field}'"
                )));
            }
        }
        Ok(())
    }

    /// Returns the person's name from the profile, or an empty string.
    #[must_use]
    pub fn person_name(&self) -> &str {
        self.profile_data
            .get(PROFILE_NAME_FIELD)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
    }

    /// Builds the streaming request for this trigger.
    #[must_use]
    pub fn to_request(&self, request_id: impl Into<String>) -> WorkflowRequest {
        WorkflowRequest {
            source_document: self.source_document.clone(),
            profile_data: self.profile_data.clone(),
            request_id: request_id.into(),
        }
    }
}

/// Body of the streaming generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRequest {
    /// Full source document text.
    pub source_document: String,
    /// The candidate profile.
    pub profile_data: serde_json::Value,
    /// Correlation id of the streaming run.
    pub request_id: String,
}

impl WorkflowRequest {
    /// Returns the non-streaming variant of this request.
    #[must_use]
    pub fn to_fallback(&self) -> FallbackRequest {
        FallbackRequest {
            source_document: self.source_document.clone(),
            profile_data: self.profile_data.clone(),
        }
    }
}

/// Body of the non-streaming fallback request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackRequest {
    /// Full source document text.
    pub source_document: String,
    /// The candidate profile.
    pub profile_data: serde_json::Value,
}

/// Final output of a generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    /// Per-stage data.
    pub stages: StageMap,
    /// Synthesized final experience text.
    pub final_experience_text: String,
    /// Synthesized role classification.
    pub role_classification: String,
    /// Tailored profile produced by the review stage, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_profile: Option<serde_json::Value>,
}

impl WorkflowResult {
    /// Synthesizes a result from stage data.
    ///
    /// Explicit values win; otherwise the final text comes from the review
    /// stage (then the experience stage) and the role from the classification
    /// stage.
    #[must_use]
    pub fn from_stages(
        stages: StageMap,
        final_experience_text: Option<String>,
        role_classification: Option<String>,
    ) -> Self {
        let non_empty = |s: &Option<String>| s.clone().filter(|v| !v.trim().is_empty());

        let final_experience_text = non_empty(&final_experience_text)
            .or_else(|| {
                stages
                    .get(&StageKey::Review)
                    .and_then(|d| non_empty(&d.content))
            })
            .or_else(|| {
                stages
                    .get(&StageKey::Experience)
                    .and_then(|d| non_empty(&d.content))
            })
            .unwrap_or_default();

        let role_classification = non_empty(&role_classification)
            .or_else(|| {
                stages
                    .get(&StageKey::Classification)
                    .and_then(StageData::role_classification)
                    .map(str::to_string)
            })
            .unwrap_or_default();

        let final_profile = [StageKey::Review, StageKey::Profile]
            .iter()
            .find_map(|key| stages.get(key).and_then(StageData::profile_json))
            .cloned();

        Self {
            stages,
            final_experience_text,
            role_classification,
            final_profile,
        }
    }

    /// Returns true if both synthesized fields are populated.
    #[must_use]
    pub fn has_final_fields(&self) -> bool {
        !self.final_experience_text.trim().is_empty() && !self.role_classification.trim().is_empty()
    }

    /// Returns the data of one stage.
    #[must_use]
    pub fn stage(&self, key: StageKey) -> Option<&StageData> {
        self.stages.get(&key)
    }

    /// Sums token usage across all stages.
    #[must_use]
    pub fn total_tokens(&self) -> TokenUsage {
        self.stages
            .values()
            .filter_map(|d| d.tokens)
            .fold(TokenUsage::default(), |acc, t| acc + t)
    }
}
