//! Visual diff engine: render both code triples, diff the screenshots.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use pixelgrade_core::diff::{compare, DiffOptions};
use pixelgrade_core::error::EvalError;
use pixelgrade_core::model::CodeTriple;
use pixelgrade_core::results::VisualDiffResult;
use pixelgrade_core::traits::VisualComparer;

use crate::artifacts::{decode_png, ArtifactStore};
use crate::browser::BrowserPool;
use crate::capture::{ChromeRenderer, PageRenderer};
use crate::document::build_document;
use crate::RenderConfig;

/// [`VisualComparer`] that renders through a [`PageRenderer`].
///
/// Every comparison writes its candidate, expected and diff screenshots.
pub struct BrowserComparer {
    renderer: Arc<dyn PageRenderer>,
    artifacts: ArtifactStore,
}

impl BrowserComparer {
    pub fn new(renderer: Arc<dyn PageRenderer>, artifacts: ArtifactStore) -> Self {
        Self {
            renderer,
            artifacts,
        }
    }

    /// Comparer backed by Chromium, launched on first use.
    ///
    /// The returned pool must be shut down by the caller when done.
    pub fn chrome(config: RenderConfig) -> (Self, Arc<BrowserPool>) {
        let pool = Arc::new(BrowserPool::new(config.chrome_executable.clone()));
        let artifacts = ArtifactStore::new(config.artifacts_dir.clone());
        let renderer = ChromeRenderer::new(Arc::clone(&pool), config);
        (Self::new(Arc::new(renderer), artifacts), pool)
    }
}

#[async_trait]
impl VisualComparer for BrowserComparer {
    #[instrument(skip(self, candidate, expected))]
    async fn compare(
        &self,
        candidate: &CodeTriple,
        expected: &CodeTriple,
        run_id: &str,
    ) -> Result<VisualDiffResult> {
        let candidate_shot = self
            .renderer
            .render(&build_document(candidate))
            .await
            .context("failed to render candidate")?;
        let expected_shot = self
            .renderer
            .render(&build_document(expected))
            .await
            .context("failed to render expected solution")?;

        let candidate_frame = decode_png(&candidate_shot.png)?;
        let expected_frame = decode_png(&expected_shot.png)?;
        let outcome = tokio::task::spawn_blocking(move || {
            compare(&candidate_frame, &expected_frame, &DiffOptions::default())
        })
        .await
        .context("pixel diff task failed")?;

        let mut result = outcome.to_result();
        debug!(
            diff_pixels = result.diff_pixels,
            total_pixels = result.total_pixels,
            "screenshots compared"
        );

        if let Some(m) = result.size_mismatch {
            let err = EvalError::ImageSizeMismatch {
                candidate_width: m.candidate_width,
                candidate_height: m.candidate_height,
                expected_width: m.expected_width,
                expected_height: m.expected_height,
            };
            warn!(%err, "comparing over the expected grid");
        }
        if let Some(message) = candidate_shot.script_error {
            warn!(error = %EvalError::RenderScriptError(message.clone()), "candidate script failed");
            result.script_error = Some(message);
        }

        result.screenshots = self
            .artifacts
            .write(run_id, &candidate_shot.png, &expected_shot.png, &outcome.image)
            .await?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::encode_png;
    use crate::capture::Capture;
    use pixelgrade_core::diff::Frame;
    use std::path::Path;

    /// Renders documents containing `MARKER` as a red frame, anything else
    /// white. Documents with `SHORT` render shorter.
    struct FakeRenderer;

    #[async_trait]
    impl PageRenderer for FakeRenderer {
        async fn render(&self, document: &str) -> Result<Capture> {
            let height = if document.contains("SHORT") { 10 } else { 20 };
            let colour = if document.contains("MARKER") {
                [255, 0, 0, 255]
            } else {
                [255, 255, 255, 255]
            };
            let script_error = document
                .contains("throw")
                .then(|| "boom".to_string());
            Ok(Capture {
                png: encode_png(&Frame::solid(20, height, colour))?,
                script_error,
            })
        }
    }

    struct TimingOutRenderer;

    #[async_trait]
    impl PageRenderer for TimingOutRenderer {
        async fn render(&self, _: &str) -> Result<Capture> {
            Err(EvalError::RenderTimeout(30).into())
        }
    }

    fn comparer(dir: &Path) -> BrowserComparer {
        BrowserComparer::new(Arc::new(FakeRenderer), ArtifactStore::new(dir))
    }

    #[tokio::test]
    async fn identical_code_scores_full_marks() {
        let code = CodeTriple::new("<h1>Hi</h1>", "h1 { color: blue }", "");
        let dir = tempfile::tempdir().unwrap();
        let result = comparer(dir.path()).compare(&code, &code, "sub-1").await.unwrap();
        assert_eq!(result.score, 100);
        assert_eq!(result.diff_pixels, 0);
        assert_eq!(result.total_pixels, 400);
        assert!(result.size_mismatch.is_none());
        assert!(result.script_error.is_none());
    }

    #[tokio::test]
    async fn different_rendering_lowers_score() {
        let expected = CodeTriple::html("<h1>Hi</h1>");
        let candidate = CodeTriple::html("<h1>MARKER</h1>");
        let dir = tempfile::tempdir().unwrap();
        let result = comparer(dir.path())
            .compare(&candidate, &expected, "sub-2")
            .await
            .unwrap();
        assert_eq!(result.score, 0);
        assert_eq!(result.diff_percentage, 100.0);
    }

    #[tokio::test]
    async fn size_mismatch_is_flagged_not_fatal() {
        let expected = CodeTriple::html("<p>x</p>");
        let candidate = CodeTriple::html("<p>SHORT</p>");
        let dir = tempfile::tempdir().unwrap();
        let result = comparer(dir.path())
            .compare(&candidate, &expected, "sub-3")
            .await
            .unwrap();
        let mismatch = result.size_mismatch.unwrap();
        assert_eq!(mismatch.candidate_height, 10);
        assert_eq!(mismatch.expected_height, 20);
        assert_eq!(result.score, 50);
    }

    #[tokio::test]
    async fn script_error_is_recorded() {
        let expected = CodeTriple::html("<p>x</p>");
        let candidate = CodeTriple::new("<p>x</p>", "", "throw new Error('boom')");
        let dir = tempfile::tempdir().unwrap();
        let result = comparer(dir.path())
            .compare(&candidate, &expected, "sub-4")
            .await
            .unwrap();
        assert_eq!(result.script_error.as_deref(), Some("boom"));
        assert_eq!(result.score, 100);
    }

    #[tokio::test]
    async fn every_comparison_writes_three_screenshots() {
        let dir = tempfile::tempdir().unwrap();
        let code = CodeTriple::html("<p>x</p>");
        let result = comparer(dir.path())
            .compare(&code, &code, "sub-5")
            .await
            .unwrap();
        for path in [
            &result.screenshots.candidate,
            &result.screenshots.expected,
            &result.screenshots.diff,
        ] {
            assert!(!path.is_empty());
            assert!(Path::new(path).is_file(), "{path} missing");
        }
    }

    #[tokio::test]
    async fn chrome_comparer_uses_default_screenshot_dir() {
        let (comparer, pool) = BrowserComparer::chrome(RenderConfig::default());
        assert_eq!(
            comparer.artifacts.dir(),
            Path::new(crate::DEFAULT_ARTIFACTS_DIR)
        );
        assert!(!pool.is_launched().await);
    }

    #[tokio::test]
    async fn render_timeout_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let comparer = BrowserComparer::new(Arc::new(TimingOutRenderer), ArtifactStore::new(dir.path()));
        let code = CodeTriple::html("<p>x</p>");
        let err = comparer.compare(&code, &code, "sub-6").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EvalError>(),
            Some(EvalError::RenderTimeout(30))
        ));
    }
}
