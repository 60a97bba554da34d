//! In-memory challenge and submission store.
//!
//! Everything lives behind one mutex, so claiming is a single critical
//! section. Useful for tests and single-process deployments.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;

use pixelgrade_core::model::{Challenge, Submission, SubmissionStatus};
use pixelgrade_core::results::EvaluationResult;
use pixelgrade_core::traits::{ChallengeStore, SubmissionStore};

use crate::error::{check_transition, StoreError};

#[derive(Debug, Default)]
struct State {
    challenges: HashMap<String, Challenge>,
    /// Insertion order doubles as queue order.
    submissions: Vec<Submission>,
}

impl State {
    fn find_mut(&mut self, id: &str) -> Result<&mut Submission, StoreError> {
        self.submissions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::SubmissionNotFound(id.to_string()))
    }
}

/// Store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Add or replace a challenge.
    pub fn insert_challenge(&self, challenge: Challenge) -> Result<()> {
        self.lock()?
            .challenges
            .insert(challenge.id.clone(), challenge);
        Ok(())
    }

    /// All submissions currently in `status`, oldest first.
    pub fn submissions_with_status(&self, status: SubmissionStatus) -> Result<Vec<Submission>> {
        Ok(self
            .lock()?
            .submissions
            .iter()
            .filter(|s| s.status == status)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ChallengeStore for MemoryStore {
    async fn get_challenge(&self, id: &str) -> Result<Option<Challenge>> {
        Ok(self.lock()?.challenges.get(id).cloned())
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn enqueue(&self, submission: Submission) -> Result<()> {
        let mut state = self.lock()?;
        if state.submissions.iter().any(|s| s.id == submission.id) {
            return Err(StoreError::Duplicate(submission.id).into());
        }
        state.submissions.push(submission);
        Ok(())
    }

    async fn claim_next_queued(&self) -> Result<Option<Submission>> {
        let mut state = self.lock()?;
        let next = state
            .submissions
            .iter_mut()
            .filter(|s| s.status == SubmissionStatus::Queued)
            .min_by_key(|s| s.created_at);
        Ok(next.map(|submission| {
            submission.status = SubmissionStatus::Evaluating;
            submission.clone()
        }))
    }

    async fn update_status(&self, id: &str, status: SubmissionStatus) -> Result<()> {
        let mut state = self.lock()?;
        let submission = state.find_mut(id)?;
        check_transition(id, submission.status, status)?;
        submission.status = status;
        Ok(())
    }

    async fn record_evaluation(&self, id: &str, result: &EvaluationResult) -> Result<()> {
        let mut state = self.lock()?;
        let submission = state.find_mut(id)?;
        let status = SubmissionStatus::from_verdict(result.passed);
        check_transition(id, submission.status, status)?;
        submission.status = status;
        submission.evaluation = Some(result.clone());
        Ok(())
    }

    async fn get_submission(&self, id: &str) -> Result<Option<Submission>> {
        Ok(self
            .lock()?
            .submissions
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }
}
