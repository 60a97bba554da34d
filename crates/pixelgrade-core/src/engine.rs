//! Evaluation orchestrator.
//!
//! Runs the content checker, the role matcher and the visual comparer in
//! order, blends their scores and assembles feedback. Any stage failure,
//! returned or panicked, becomes a degraded result; `evaluate` never fails.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, error, info, instrument, warn};

use crate::content::evaluate_content;
use crate::error::{EvalError, Stage};
use crate::model::{Challenge, CodeTriple, Submission, Thresholds};
use crate::results::{
    final_score, ContentReport, EvaluationResult, VisualDiffResult, VisualReport, PASS_GATE,
};
use crate::semantic::{build_feedback, RoleCatalogue};
use crate::traits::VisualComparer;

/// Most missing items listed per feedback line.
const MAX_LISTED: usize = 3;

/// The hybrid evaluator.
pub struct Evaluator {
    comparer: Arc<dyn VisualComparer>,
    catalogue: RoleCatalogue,
}

impl Evaluator {
    /// Evaluator with the built-in role catalogue.
    pub fn new(comparer: Arc<dyn VisualComparer>) -> Result<Self> {
        Ok(Self::with_catalogue(comparer, RoleCatalogue::builtin()?))
    }

    pub fn with_catalogue(comparer: Arc<dyn VisualComparer>, catalogue: RoleCatalogue) -> Self {
        Self {
            comparer,
            catalogue,
        }
    }

    /// Grade a queued submission against its challenge.
    pub async fn evaluate_submission(
        &self,
        submission: &Submission,
        challenge: &Challenge,
    ) -> EvaluationResult {
        self.evaluate(
            &submission.code,
            &challenge.expected_solution,
            challenge.passing_threshold,
            &submission.id,
            Some(&challenge.id),
        )
        .await
    }

    /// Grade `candidate` against `expected`.
    #[instrument(skip(self, candidate, expected, thresholds))]
    pub async fn evaluate(
        &self,
        candidate: &CodeTriple,
        expected: &CodeTriple,
        thresholds: Thresholds,
        submission_id: &str,
        challenge_id: Option<&str>,
    ) -> EvaluationResult {
        let outcome = AssertUnwindSafe(self.run_stages(
            candidate,
            expected,
            thresholds,
            submission_id,
            challenge_id,
        ))
        .catch_unwind()
        .await;

        match outcome {
            Ok(Ok(result)) => {
                info!(
                    content = result.content_score,
                    structure = result.structure_score,
                    visual = result.visual_score,
                    final_score = result.final_score,
                    passed = result.passed,
                    "evaluation complete"
                );
                result
            }
            Ok(Err(err)) => {
                error!(error = %err, "evaluation failed");
                EvaluationResult::degraded(submission_id, challenge_id, thresholds, err)
            }
            Err(payload) => {
                let message = format!("evaluation panicked: {}", panic_message(&*payload));
                error!("{message}");
                EvaluationResult::degraded(submission_id, challenge_id, thresholds, message)
            }
        }
    }

    async fn run_stages(
        &self,
        candidate: &CodeTriple,
        expected: &CodeTriple,
        thresholds: Thresholds,
        submission_id: &str,
        challenge_id: Option<&str>,
    ) -> Result<EvaluationResult, EvalError> {
        let content = run_sync(Stage::Content, || evaluate_content(candidate, expected))?;
        debug!(score = content.score, "content stage done");

        let structure = run_sync(Stage::Structure, || {
            self.catalogue
                .evaluate(candidate, expected, thresholds.structure)
        })?;
        debug!(score = structure.score, "structure stage done");

        let visual = self
            .comparer
            .compare(candidate, expected, submission_id)
            .await
            .map_err(|err| match err.downcast::<EvalError>() {
                Ok(eval_err) => eval_err,
                Err(other) => EvalError::stage(Stage::Visual, format!("{other:#}")),
            })?;
        debug!(score = visual.score, diff_pixels = visual.diff_pixels, "visual stage done");
        if let Some(mismatch) = &visual.size_mismatch {
            warn!(?mismatch, "screenshot sizes differ");
        }

        // Reserved for interactivity testing
        let behavior_score = 0;

        let final_score = final_score(content.score, structure.score, visual.score, behavior_score);
        let passed =
            content.score >= PASS_GATE && visual.score >= PASS_GATE && final_score >= PASS_GATE;

        let mut feedback = content_feedback(&content);
        feedback.extend(visual_feedback(&visual, thresholds.visual));
        feedback.extend(build_feedback(&structure, visual.score));

        Ok(EvaluationResult {
            submission_id: submission_id.to_string(),
            challenge_id: challenge_id.map(str::to_string),
            timestamp: Utc::now(),
            content_score: content.score,
            structure_score: structure.score,
            visual_score: visual.score,
            behavior_score,
            final_score,
            passed,
            thresholds,
            content: Some(content),
            structure: Some(structure),
            visual: Some(VisualReport {
                passed: visual.score >= thresholds.visual,
                diff: visual,
            }),
            feedback,
            error: None,
        })
    }
}

/// Run a synchronous stage, turning a panic into a stage error.
fn run_sync<T>(stage: Stage, f: impl FnOnce() -> T) -> Result<T, EvalError> {
    catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| EvalError::stage(stage, format!("panicked: {}", panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Feedback
// ---------------------------------------------------------------------------

fn content_feedback(content: &ContentReport) -> Vec<String> {
    content
        .requirements
        .iter()
        .filter(|r| !r.passed)
        .map(|r| {
            let mut line = format!("Improve {}: {}", r.kind, r.details);
            if !r.missing.is_empty() {
                let listed: Vec<&str> = r.missing.iter().take(MAX_LISTED).map(String::as_str).collect();
                line.push_str(&format!(" (missing: {}", listed.join(", ")));
                if r.missing.len() > MAX_LISTED {
                    line.push_str(&format!(" and {} more", r.missing.len() - MAX_LISTED));
                }
                line.push(')');
            }
            line
        })
        .collect()
}

fn visual_feedback(visual: &VisualDiffResult, threshold: u8) -> Vec<String> {
    let mut feedback = Vec::new();
    if let Some(message) = &visual.script_error {
        feedback.push(format!("Your JavaScript threw an error: {message}"));
    }
    if let Some(m) = &visual.size_mismatch {
        feedback.push(format!(
            "Your page renders at {}x{} but the design is {}x{}.",
            m.candidate_width, m.candidate_height, m.expected_width, m.expected_height
        ));
    }
    if visual.score < threshold {
        feedback.push(format!(
            "Visual match is {}%; aim for at least {threshold}%. {:.1}% of pixels differ.",
            visual.score, visual.diff_percentage
        ));
    }
    feedback
}
