//! Evaluation error taxonomy.
//!
//! Only `ChallengeNotFound` ever aborts a queue item. Script errors and size
//! mismatches are absorbed into the visual result, and everything a stage
//! returns is converted into a degraded `EvaluationResult` by the evaluator.

use thiserror::Error;

/// Which scoring stage produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Content,
    Structure,
    Visual,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Content => write!(f, "content"),
            Stage::Structure => write!(f, "structure"),
            Stage::Visual => write!(f, "visual"),
        }
    }
}

/// Errors raised while evaluating a submission.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Navigation or screenshot capture exceeded the render bound.
    #[error("render timed out after {0}s")]
    RenderTimeout(u64),

    /// The candidate's script threw inside the rendered page.
    #[error("candidate script error: {0}")]
    RenderScriptError(String),

    /// Candidate and expected screenshots have different dimensions.
    #[error(
        "screenshot size mismatch: candidate {candidate_width}x{candidate_height}, \
         expected {expected_width}x{expected_height}"
    )]
    ImageSizeMismatch {
        candidate_width: u32,
        candidate_height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    /// The challenge referenced by a submission does not exist.
    #[error("challenge not found: {0}")]
    ChallengeNotFound(String),

    /// A scoring stage failed unexpectedly.
    #[error("{stage} stage failed: {message}")]
    Stage { stage: Stage, message: String },
}

impl EvalError {
    pub fn stage(stage: Stage, err: impl std::fmt::Display) -> Self {
        EvalError::Stage {
            stage,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_message() {
        let err = EvalError::stage(Stage::Visual, "browser crashed");
        assert_eq!(err.to_string(), "visual stage failed: browser crashed");
    }

    #[test]
    fn size_mismatch_message_names_both_sizes() {
        let err = EvalError::ImageSizeMismatch {
            candidate_width: 1280,
            candidate_height: 700,
            expected_width: 1280,
            expected_height: 720,
        };
        assert_eq!(
            err.to_string(),
            "screenshot size mismatch: candidate 1280x700, expected 1280x720"
        );
    }
}
