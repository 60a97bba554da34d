//! Directory-backed challenge and submission store.
//!
//! Layout under the root:
//!
//! ```text
//! challenges/<id>.toml
//! submissions/<status>/<id>.json
//! submissions/.tmp/
//! ```
//!
//! Challenges may live elsewhere; see [`FsStore::with_challenges_dir`].
//!
//! The directory a submission file sits in is its status. Claiming is a
//! `rename` out of `queued/`, which the filesystem performs atomically, so
//! several workers may share one root.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use pixelgrade_core::model::{Challenge, Submission, SubmissionStatus};
use pixelgrade_core::parser::{load_challenge_directory, parse_challenge};
use pixelgrade_core::results::EvaluationResult;
use pixelgrade_core::traits::{ChallengeStore, SubmissionStore};

use crate::error::{check_id, check_transition, StoreError};

const CHALLENGES_DIR: &str = "challenges";
const SUBMISSIONS_DIR: &str = "submissions";
const TMP_DIR: &str = ".tmp";

/// Store rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    challenges_dir: PathBuf,
}

impl FsStore {
    /// Open (and create if needed) a store at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let store = Self {
            challenges_dir: root.join(CHALLENGES_DIR),
            root,
        };
        std::fs::create_dir_all(store.submissions_dir().join(TMP_DIR))?;
        for status in SubmissionStatus::ALL {
            std::fs::create_dir_all(store.status_dir(status))
                .with_context(|| format!("failed to create store under {}", store.root.display()))?;
        }
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read challenges from `dir` instead of `<root>/challenges`.
    pub fn with_challenges_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.challenges_dir = dir.into();
        self
    }

    pub fn challenges_dir(&self) -> &Path {
        &self.challenges_dir
    }

    fn submissions_dir(&self) -> PathBuf {
        self.root.join(SUBMISSIONS_DIR)
    }

    fn status_dir(&self, status: SubmissionStatus) -> PathBuf {
        self.submissions_dir().join(status.to_string())
    }

    fn submission_path(&self, status: SubmissionStatus, id: &str) -> PathBuf {
        self.status_dir(status).join(format!("{id}.json"))
    }

    /// Write `submission` into its status directory via a temp file.
    async fn write_submission(&self, submission: &Submission) -> Result<PathBuf> {
        let json = serde_json::to_vec_pretty(submission)?;
        let tmp = self
            .submissions_dir()
            .join(TMP_DIR)
            .join(format!("{}-{}.json", submission.id, uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, json).await?;

        let target = self.submission_path(submission.status, &submission.id);
        tokio::fs::rename(&tmp, &target).await?;
        Ok(target)
    }

    /// Read a submission file. The directory it was found in wins over the
    /// status recorded inside it.
    async fn read_submission(&self, path: &Path, status: SubmissionStatus) -> Result<Submission> {
        let bytes = tokio::fs::read(path).await?;
        let mut submission: Submission =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        submission.status = status;
        Ok(submission)
    }

    /// Find a submission in whichever status directory holds it.
    async fn locate(&self, id: &str) -> Result<Option<(PathBuf, Submission)>> {
        check_id(id)?;
        for status in SubmissionStatus::ALL {
            let path = self.submission_path(status, id);
            match self.read_submission(&path, status).await {
                Ok(submission) => return Ok(Some((path, submission))),
                Err(e) if is_not_found(&e) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Move a submission to `status`, optionally attaching a result.
    async fn transition(
        &self,
        id: &str,
        status: SubmissionStatus,
        evaluation: Option<&EvaluationResult>,
    ) -> Result<()> {
        let (old_path, mut submission) = self
            .locate(id)
            .await?
            .ok_or_else(|| StoreError::SubmissionNotFound(id.to_string()))?;
        check_transition(id, submission.status, status)?;

        submission.status = status;
        if let Some(result) = evaluation {
            submission.evaluation = Some(result.clone());
        }
        self.write_submission(&submission).await?;
        tokio::fs::remove_file(&old_path).await?;
        debug!(id, %status, "submission moved");
        Ok(())
    }

    /// Queued submissions, oldest first.
    async fn queued(&self) -> Result<Vec<(PathBuf, Submission)>> {
        let mut entries = tokio::fs::read_dir(self.status_dir(SubmissionStatus::Queued)).await?;
        let mut queued = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            match self.read_submission(&path, SubmissionStatus::Queued).await {
                Ok(submission) => queued.push((path, submission)),
                // Claimed by someone else between listing and reading
                Err(e) if is_not_found(&e) => {}
                Err(e) => warn!("skipping {}: {:#}", path.display(), e),
            }
        }
        queued.sort_by(|(_, a), (_, b)| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(queued)
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|e| e.kind() == ErrorKind::NotFound)
}

#[async_trait]
impl ChallengeStore for FsStore {
    async fn get_challenge(&self, id: &str) -> Result<Option<Challenge>> {
        check_id(id)?;
        let dir = self.challenges_dir.clone();
        if !dir.is_dir() {
            return Ok(None);
        }
        let wanted = id.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<Challenge>> {
            let direct = dir.join(format!("{wanted}.toml"));
            if direct.is_file() {
                let parsed = parse_challenge(&direct)?;
                if parsed.challenge.id == wanted {
                    return Ok(Some(parsed.challenge));
                }
            }
            // File names need not match ids; fall back to a scan
            Ok(load_challenge_directory(&dir)?
                .into_iter()
                .map(|p| p.challenge)
                .find(|c| c.id == wanted))
        })
        .await?
    }
}

#[async_trait]
impl SubmissionStore for FsStore {
    async fn enqueue(&self, mut submission: Submission) -> Result<()> {
        if self.locate(&submission.id).await?.is_some() {
            return Err(StoreError::Duplicate(submission.id).into());
        }
        submission.status = SubmissionStatus::Queued;
        let path = self.write_submission(&submission).await?;
        debug!(id = %submission.id, path = %path.display(), "submission queued");
        Ok(())
    }

    async fn claim_next_queued(&self) -> Result<Option<Submission>> {
        for (path, mut submission) in self.queued().await? {
            let claimed = self.submission_path(SubmissionStatus::Evaluating, &submission.id);
            match tokio::fs::rename(&path, &claimed).await {
                Ok(()) => {
                    submission.status = SubmissionStatus::Evaluating;
                    self.write_submission(&submission).await?;
                    return Ok(Some(submission));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    async fn update_status(&self, id: &str, status: SubmissionStatus) -> Result<()> {
        self.transition(id, status, None).await
    }

    async fn record_evaluation(&self, id: &str, result: &EvaluationResult) -> Result<()> {
        self.transition(id, SubmissionStatus::from_verdict(result.passed), Some(result))
            .await
    }

    async fn get_submission(&self, id: &str) -> Result<Option<Submission>> {
        Ok(self.locate(id).await?.map(|(_, submission)| submission))
    }
}
