//! Core data model types for pixelgrade.
//!
//! These are the records the grading core exchanges with its collaborators:
//! the code being graded, the challenge it is graded against, and the queued
//! submission that ties the two together.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::results::EvaluationResult;

/// One HTML/CSS/JS submission, or the reference solution of a challenge.
///
/// Never mutated during evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeTriple {
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub css: String,
    #[serde(default)]
    pub js: String,
}

impl CodeTriple {
    pub fn new(html: impl Into<String>, css: impl Into<String>, js: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            css: css.into(),
            js: js.into(),
        }
    }

    /// Shorthand for markup-only code.
    pub fn html(html: impl Into<String>) -> Self {
        Self::new(html, "", "")
    }

    /// Whether all three sources are blank.
    pub fn is_blank(&self) -> bool {
        self.html.trim().is_empty() && self.css.trim().is_empty() && self.js.trim().is_empty()
    }
}

/// Per-challenge passing thresholds, each in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_threshold")]
    pub structure: u8,
    #[serde(default = "default_threshold")]
    pub visual: u8,
    #[serde(default = "default_threshold")]
    pub overall: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            structure: default_threshold(),
            visual: default_threshold(),
            overall: default_threshold(),
        }
    }
}

fn default_threshold() -> u8 {
    70
}

/// A challenge as supplied by the challenge store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    /// Unique identifier.
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Free-form description shown to candidates.
    #[serde(default)]
    pub description: String,
    /// The reference solution candidates are graded against.
    pub expected_solution: CodeTriple,
    /// Thresholds used to annotate per-stage results.
    #[serde(default)]
    pub passing_threshold: Thresholds,
}

/// Lifecycle of a queued submission.
///
/// `Queued → Evaluating → {Passed, Failed, Error}`. Terminal states are never
/// revisited by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Queued,
    Evaluating,
    Passed,
    Failed,
    Error,
}

impl SubmissionStatus {
    /// Whether this status is one the worker never moves out of.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SubmissionStatus::Passed | SubmissionStatus::Failed | SubmissionStatus::Error
        )
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: SubmissionStatus) -> bool {
        match self {
            SubmissionStatus::Queued => next == SubmissionStatus::Evaluating,
            SubmissionStatus::Evaluating => next.is_terminal(),
            _ => false,
        }
    }

    /// Terminal status for a finished evaluation.
    pub fn from_verdict(passed: bool) -> Self {
        if passed {
            SubmissionStatus::Passed
        } else {
            SubmissionStatus::Failed
        }
    }

    /// All statuses, in lifecycle order.
    pub const ALL: [SubmissionStatus; 5] = [
        SubmissionStatus::Queued,
        SubmissionStatus::Evaluating,
        SubmissionStatus::Passed,
        SubmissionStatus::Failed,
        SubmissionStatus::Error,
    ];
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionStatus::Queued => write!(f, "queued"),
            SubmissionStatus::Evaluating => write!(f, "evaluating"),
            SubmissionStatus::Passed => write!(f, "passed"),
            SubmissionStatus::Failed => write!(f, "failed"),
            SubmissionStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(SubmissionStatus::Queued),
            "evaluating" => Ok(SubmissionStatus::Evaluating),
            "passed" => Ok(SubmissionStatus::Passed),
            "failed" => Ok(SubmissionStatus::Failed),
            "error" => Ok(SubmissionStatus::Error),
            other => Err(format!("unknown submission status: {other}")),
        }
    }
}

/// A submission record as held by the submission store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub code: CodeTriple,
    pub challenge_id: String,
    pub status: SubmissionStatus,
    pub created_at: DateTime<Utc>,
    /// Written back once the worker finishes scoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationResult>,
}

impl Submission {
    /// Create a freshly queued submission with a random id.
    pub fn queued(challenge_id: impl Into<String>, code: CodeTriple) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            code,
            challenge_id: challenge_id.into(),
            status: SubmissionStatus::Queued,
            created_at: Utc::now(),
            evaluation: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_and_parse() {
        for status in SubmissionStatus::ALL {
            assert_eq!(status.to_string().parse::<SubmissionStatus>(), Ok(status));
        }
        assert_eq!(
            "EVALUATING".parse::<SubmissionStatus>(),
            Ok(SubmissionStatus::Evaluating)
        );
        assert!("pending".parse::<SubmissionStatus>().is_err());
    }

    #[test]
    fn lifecycle_transitions() {
        use SubmissionStatus::*;
        assert!(Queued.can_transition_to(Evaluating));
        assert!(!Queued.can_transition_to(Passed));
        assert!(Evaluating.can_transition_to(Passed));
        assert!(Evaluating.can_transition_to(Failed));
        assert!(Evaluating.can_transition_to(Error));
        assert!(!Evaluating.can_transition_to(Queued));
        assert!(!Passed.can_transition_to(Evaluating));
        assert!(!Error.can_transition_to(Queued));
    }

    #[test]
    fn thresholds_default_to_seventy() {
        let t = Thresholds::default();
        assert_eq!((t.structure, t.visual, t.overall), (70, 70, 70));

        let partial: Thresholds = toml::from_str("visual = 85").unwrap();
        assert_eq!(partial.visual, 85);
        assert_eq!(partial.structure, 70);
    }

    #[test]
    fn submission_serde_roundtrip() {
        let sub = Submission::queued("card", CodeTriple::html("<h1>Hi</h1>"));
        let json = serde_json::to_string(&sub).unwrap();
        assert!(!json.contains("evaluation"));
        let back: Submission = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, sub.id);
        assert_eq!(back.status, SubmissionStatus::Queued);
        assert_eq!(back.code.html, "<h1>Hi</h1>");
    }
}
