//! Collaborator traits.
//!
//! The visual comparer is implemented by `pixelgrade-render`; the challenge
//! and submission stores by `pixelgrade-store`.

use async_trait::async_trait;

use crate::model::{Challenge, CodeTriple, Submission, SubmissionStatus};
use crate::results::{EvaluationResult, VisualDiffResult};

// ---------------------------------------------------------------------------
// Visual comparison
// ---------------------------------------------------------------------------

/// Renders two code triples and diffs the screenshots.
#[async_trait]
pub trait VisualComparer: Send + Sync {
    /// Compare the rendering of `candidate` against `expected`.
    ///
    /// `run_id` names the screenshot artefacts. Script errors and size
    /// mismatches are reported on the returned result, not as errors.
    async fn compare(
        &self,
        candidate: &CodeTriple,
        expected: &CodeTriple,
        run_id: &str,
    ) -> anyhow::Result<VisualDiffResult>;
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// Read access to challenges.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn get_challenge(&self, id: &str) -> anyhow::Result<Option<Challenge>>;
}

/// The submission queue.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Add a submission to the queue.
    async fn enqueue(&self, submission: Submission) -> anyhow::Result<()>;

    /// Atomically move the oldest queued submission to `Evaluating` and return
    /// it. Two concurrent callers never receive the same submission.
    async fn claim_next_queued(&self) -> anyhow::Result<Option<Submission>>;

    async fn update_status(&self, id: &str, status: SubmissionStatus) -> anyhow::Result<()>;

    /// Attach a result and set the matching terminal status.
    async fn record_evaluation(&self, id: &str, result: &EvaluationResult) -> anyhow::Result<()>;

    async fn get_submission(&self, id: &str) -> anyhow::Result<Option<Submission>>;
}
