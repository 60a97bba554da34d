//! Remote challenge and submission store over HTTP.
//!
//! | operation            | request                              | empty result |
//! |----------------------|--------------------------------------|--------------|
//! | `get_challenge`      | `GET  /challenges/{id}`              | 404          |
//! | `enqueue`            | `POST /submissions`                  |              |
//! | `claim_next_queued`  | `POST /submissions/claim`            | 204          |
//! | `update_status`      | `PUT  /submissions/{id}/status`      |              |
//! | `record_evaluation`  | `PUT  /submissions/{id}/evaluation`  |              |
//! | `get_submission`     | `GET  /submissions/{id}`             | 404          |
//!
//! The server is responsible for making `claim` atomic.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use pixelgrade_core::model::{Challenge, Submission, SubmissionStatus};
use pixelgrade_core::results::EvaluationResult;
use pixelgrade_core::traits::{ChallengeStore, SubmissionStore};

use crate::error::{check_id, StoreError};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Serialize)]
struct StatusUpdate {
    status: SubmissionStatus,
}

/// Store client for a remote queue service.
pub struct HttpStore {
    base_url: Url,
    api_token: Option<String>,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStore")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &self.api_token.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl HttpStore {
    pub fn new(base_url: &str, api_token: Option<String>, timeout_secs: Option<u64>) -> Result<Self> {
        let timeout_secs = timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        let base_url = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("invalid store base_url {base_url:?}: {e}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("invalid store base_url {base_url}: cannot be a base");
        }

        Ok(Self {
            base_url,
            api_token,
            timeout_secs,
            client,
        })
    }

    /// Append path segments to the base URL. Segments are percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("base_url cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => req.header("Authorization", format!("Bearer {token}")),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, StoreError> {
        self.authorize(req).send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Timeout(self.timeout_secs)
            } else {
                StoreError::NetworkError(e.to_string())
            }
        })
    }

    /// Turn error statuses into `StoreError`s.
    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::AuthenticationFailed(body));
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::ApiError {
                status,
                message: body,
            });
        }
        Ok(response)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
        let status = response.status().as_u16();
        response.json().await.map_err(|e| StoreError::ApiError {
            status,
            message: format!("failed to parse response: {e}"),
        })
    }
}

#[async_trait]
impl ChallengeStore for HttpStore {
    #[instrument(skip(self))]
    async fn get_challenge(&self, id: &str) -> Result<Option<Challenge>> {
        check_id(id)?;
        let url = self.endpoint(&["challenges", id])?;
        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response).await?;
        Ok(Some(Self::parse(response).await?))
    }
}

#[async_trait]
impl SubmissionStore for HttpStore {
    #[instrument(skip(self, submission), fields(id = %submission.id))]
    async fn enqueue(&self, submission: Submission) -> Result<()> {
        check_id(&submission.id)?;
        let url = self.endpoint(&["submissions"])?;
        let response = self.send(self.client.post(url).json(&submission)).await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(StoreError::Duplicate(submission.id).into());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn claim_next_queued(&self) -> Result<Option<Submission>> {
        let url = self.endpoint(&["submissions", "claim"])?;
        let response = self.send(self.client.post(url)).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let response = Self::check(response).await?;
        let submission: Submission = Self::parse(response).await?;
        debug!(id = %submission.id, "claimed submission");
        Ok(Some(submission))
    }

    #[instrument(skip(self))]
    async fn update_status(&self, id: &str, status: SubmissionStatus) -> Result<()> {
        check_id(id)?;
        let url = self.endpoint(&["submissions", id, "status"])?;
        let response = self
            .send(self.client.put(url).json(&StatusUpdate { status }))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::SubmissionNotFound(id.to_string()).into());
        }
        Self::check(response).await?;
        Ok(())
    }

    #[instrument(skip(self, result), fields(passed = result.passed))]
    async fn record_evaluation(&self, id: &str, result: &EvaluationResult) -> Result<()> {
        check_id(id)?;
        let url = self.endpoint(&["submissions", id, "evaluation"])?;
        let response = self.send(self.client.put(url).json(result)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::SubmissionNotFound(id.to_string()).into());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn get_submission(&self, id: &str) -> Result<Option<Submission>> {
        check_id(id)?;
        let url = self.endpoint(&["submissions", id])?;
        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response).await?;
        Ok(Some(Self::parse(response).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixelgrade_core::model::{CodeTriple, Thresholds};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> HttpStore {
        HttpStore::new(&format!("{}/api/", server.uri()), Some("secret".into()), Some(5)).unwrap()
    }

    #[tokio::test]
    async fn fetches_challenge_with_bearer_token() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "id": "card",
            "name": "Card",
            "expected_solution": {"html": "<h1>Card</h1>"}
        });

        Mock::given(method("GET"))
            .and(path("/api/challenges/card"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let challenge = store(&server).get_challenge("card").await.unwrap().unwrap();
        assert_eq!(challenge.expected_solution.html, "<h1>Card</h1>");
        assert_eq!(challenge.passing_threshold, Thresholds::default());
    }

    #[tokio::test]
    async fn missing_challenge_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/challenges/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(store(&server).get_challenge("gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_queue_returns_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/submissions/claim"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        assert!(store(&server).claim_next_queued().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claims_submission() {
        let server = MockServer::start().await;
        let mut sub = Submission::queued("card", CodeTriple::html("<p>x</p>"));
        sub.status = SubmissionStatus::Evaluating;

        Mock::given(method("POST"))
            .and(path("/api/submissions/claim"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&sub))
            .mount(&server)
            .await;

        let claimed = store(&server).claim_next_queued().await.unwrap().unwrap();
        assert_eq!(claimed.id, sub.id);
        assert_eq!(claimed.status, SubmissionStatus::Evaluating);
    }

    #[tokio::test]
    async fn sends_status_update() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/submissions/s1/status"))
            .and(body_json(serde_json::json!({"status": "error"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        store(&server)
            .update_status("s1", SubmissionStatus::Error)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn maps_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/submissions"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/submissions/s1"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/submissions/s1/evaluation"))
            .respond_with(ResponseTemplate::new(500).set_body_string("database down"))
            .mount(&server)
            .await;

        let store = store(&server);
        let sub = Submission::queued("card", CodeTriple::html("<p>x</p>"));
        let err = store.enqueue(sub).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));

        let err = store.get_submission("s1").await.unwrap_err();
        assert!(err.to_string().contains("authentication failed"));

        let result = EvaluationResult::degraded("s1", None, Thresholds::default(), "x");
        let err = store.record_evaluation("s1", &result).await.unwrap_err();
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("database down"));
    }

    #[tokio::test]
    async fn rejects_ids_that_escape_the_path() {
        let server = MockServer::start().await;
        let err = store(&server).get_submission("../admin").await.unwrap_err();
        assert!(err.to_string().contains("invalid id"));
    }

    #[test]
    fn debug_masks_token() {
        let store = HttpStore::new("http://localhost:1", Some("secret".into()), None).unwrap();
        let debug = format!("{store:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn rejects_bad_base_url() {
        assert!(HttpStore::new("not a url", None, None).is_err());
        assert!(HttpStore::new("mailto:ops@example.com", None, None).is_err());
    }
}
