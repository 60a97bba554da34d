//! Background evaluation worker.
//!
//! Polls the submission store, claims queued submissions while fewer than
//! `max_concurrent` evaluations are in flight, and records each result. A
//! finished evaluation triggers an immediate re-claim instead of waiting for
//! the next tick.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::engine::Evaluator;
use crate::error::EvalError;
use crate::model::{Submission, SubmissionStatus};
use crate::results::EvaluationResult;
use crate::traits::{ChallengeStore, SubmissionStore};

/// Worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Delay between queue polls.
    pub poll_interval: Duration,
    /// Evaluations allowed in flight at once.
    pub max_concurrent: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_concurrent: 2,
        }
    }
}

/// Lifecycle hooks for worker activity.
pub trait WorkerObserver: Send + Sync {
    fn on_claimed(&self, submission: &Submission);
    fn on_evaluated(&self, submission_id: &str, result: &EvaluationResult);
    fn on_failed(&self, submission_id: &str, error: &str);
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl WorkerObserver for NoopObserver {
    fn on_claimed(&self, _: &Submission) {}
    fn on_evaluated(&self, _: &str, _: &EvaluationResult) {}
    fn on_failed(&self, _: &str, _: &str) {}
}

struct Shared {
    evaluator: Arc<Evaluator>,
    challenges: Arc<dyn ChallengeStore>,
    submissions: Arc<dyn SubmissionStore>,
    observer: Arc<dyn WorkerObserver>,
    config: WorkerConfig,
    permits: Arc<Semaphore>,
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Queue worker driving an [`Evaluator`].
pub struct EvaluationWorker {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl EvaluationWorker {
    pub fn new(
        evaluator: Arc<Evaluator>,
        challenges: Arc<dyn ChallengeStore>,
        submissions: Arc<dyn SubmissionStore>,
        config: WorkerConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            shared: Arc::new(Shared {
                evaluator,
                challenges,
                submissions,
                observer: Arc::new(NoopObserver),
                config,
                permits,
            }),
            running: Mutex::new(None),
        }
    }

    /// Attach an observer. Must be called before [`start`](Self::start).
    pub fn with_observer(mut self, observer: Arc<dyn WorkerObserver>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.observer = observer;
        }
        self
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Start polling. Calling `start` on a running worker does nothing.
    pub fn start(&self) {
        let Ok(mut running) = self.running.lock() else {
            error!("worker state lock poisoned");
            return;
        };
        if running.is_some() {
            debug!("worker already running");
            return;
        }

        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(Arc::clone(&self.shared), rx));
        *running = Some(Running { shutdown, handle });
        info!(
            max_concurrent = self.shared.config.max_concurrent,
            poll_ms = self.shared.config.poll_interval.as_millis() as u64,
            "worker started"
        );
    }

    /// Stop polling and wait for in-flight evaluations to finish.
    /// Calling `stop` on a stopped worker does nothing.
    pub async fn stop(&self) {
        let running = match self.running.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let Some(Running { shutdown, handle }) = running else {
            return;
        };

        let _ = shutdown.send(true);
        if let Err(e) = handle.await {
            error!(error = %e, "worker loop ended abnormally");
        }
        info!("worker stopped");
    }
}

// ---------------------------------------------------------------------------
// Polling loop
// ---------------------------------------------------------------------------

async fn run_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut tasks = JoinSet::new();

    loop {
        shared.claim_available(&mut tasks).await;

        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "evaluation task failed");
                }
            }
            _ = tokio::time::sleep(shared.config.poll_interval) => {}
        }
    }

    debug!(in_flight = tasks.len(), "draining in-flight evaluations");
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "evaluation task failed");
        }
    }
}

impl Shared {
    /// Claim submissions until the queue is empty or every permit is taken.
    async fn claim_available(self: &Arc<Self>, tasks: &mut JoinSet<()>) {
        loop {
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                return;
            };
            match self.submissions.claim_next_queued().await {
                Ok(Some(submission)) => {
                    debug!(submission_id = %submission.id, "claimed submission");
                    tasks.spawn(process(Arc::clone(self), submission, permit));
                }
                Ok(None) => return,
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "failed to claim submission");
                    return;
                }
            }
        }
    }

    async fn evaluate_and_record(&self, submission: &Submission) -> Result<()> {
        let challenge = self
            .challenges
            .get_challenge(&submission.challenge_id)
            .await?
            .ok_or_else(|| EvalError::ChallengeNotFound(submission.challenge_id.clone()))?;

        let result = self
            .evaluator
            .evaluate_submission(submission, &challenge)
            .await;
        self.submissions
            .record_evaluation(&submission.id, &result)
            .await?;
        self.observer.on_evaluated(&submission.id, &result);
        Ok(())
    }
}

/// Evaluate one claimed submission. The permit is held until it is done.
#[instrument(skip_all, fields(submission_id = %submission.id))]
async fn process(shared: Arc<Shared>, submission: Submission, _permit: OwnedSemaphorePermit) {
    shared.observer.on_claimed(&submission);

    if let Err(err) = shared.evaluate_and_record(&submission).await {
        let message = format!("{err:#}");
        error!(error = %message, "submission failed");
        shared.observer.on_failed(&submission.id, &message);
        if let Err(e) = shared
            .submissions
            .update_status(&submission.id, SubmissionStatus::Error)
            .await
        {
            error!(error = %format!("{e:#}"), "failed to mark submission as errored");
        }
    }
}
