//! Stage key and status enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the four ordered stages of the generation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKey {
    /// Role classification and job-description insights.
    Classification,
    /// Work-experience drafting.
    Experience,
    /// Profile (non-work sections) extraction.
    Profile,
    /// Final review and style unification.
    Review,
}

impl StageKey {
    /// All stages in pipeline order.
    pub const ALL: [Self; 4] = [
        Self::Classification,
        Self::Experience,
        Self::Profile,
        Self::Review,
    ];

    /// Returns the position of the stage in pipeline order.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Classification => 0,
            Self::Experience => 1,
            Self::Profile => 2,
            Self::Review => 3,
        }
    }

    /// Returns the stage that follows this one, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Classification => Some(Self::Experience),
            Self::Experience => Some(Self::Profile),
            Self::Profile => Some(Self::Review),
            Self::Review => None,
        }
    }

    /// Returns the wire name of the stage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Experience => "experience",
            Self::Profile => "profile",
            Self::Review => "review",
        }
    }

    /// Returns true if this is the last stage of the pipeline.
    #[must_use]
    pub const fn is_last(self) -> bool {
        matches!(self, Self::Review)
    }
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classification" | "classifier" => Ok(Self::Classification),
            "experience" => Ok(Self::Experience),
            "profile" => Ok(Self::Profile),
            "review" | "reviewer" => Ok(Self::Review),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

/// The progress status of a single stage within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage has not started.
    #[default]
    Pending,
    /// Stage is currently running.
    InProgress,
    /// Stage finished successfully.
    Completed,
    /// Stage failed.
    Error,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status can no longer change within a run.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Ordering rank used to check forward-only transitions.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Error => 2,
        }
    }
}
