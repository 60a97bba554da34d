//! Page rendering and screenshot capture.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use tracing::{debug, instrument};

use pixelgrade_core::error::EvalError;

use crate::browser::BrowserPool;
use crate::document::SCRIPT_ERROR_GLOBAL;
use crate::{RenderConfig, VIEWPORT_HEIGHT, VIEWPORT_WIDTH};

/// Default pause after the document loads before capturing.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(250);

/// A rendered page.
#[derive(Debug, Clone)]
pub struct Capture {
    /// Viewport screenshot as PNG.
    pub png: Vec<u8>,
    /// Uncaught error raised by the page's script, if any.
    pub script_error: Option<String>,
}

/// Renders a full HTML document to a screenshot.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, document: &str) -> Result<Capture>;
}

/// Renderer backed by the shared headless browser.
pub struct ChromeRenderer {
    pool: Arc<BrowserPool>,
    config: RenderConfig,
}

impl ChromeRenderer {
    pub fn new(pool: Arc<BrowserPool>, config: RenderConfig) -> Self {
        Self { pool, config }
    }

    async fn capture_on(&self, page: &Page, document: &str) -> Result<Capture> {
        page.execute(SetDeviceMetricsOverrideParams::new(
            VIEWPORT_WIDTH as i64,
            VIEWPORT_HEIGHT as i64,
            1.0,
            false,
        ))
        .await
        .context("failed to set viewport")?;

        page.set_content(document)
            .await
            .context("failed to load document")?;
        tokio::time::sleep(self.config.settle).await;

        let script_error = page
            .evaluate(format!("window.{SCRIPT_ERROR_GLOBAL}"))
            .await
            .context("failed to read script error")?
            .into_value::<Option<String>>()
            .ok()
            .flatten();

        let png = page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(false)
                    .omit_background(false)
                    .build(),
            )
            .await
            .context("failed to capture screenshot")?;

        Ok(Capture { png, script_error })
    }
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    #[instrument(skip_all, fields(bytes = document.len()))]
    async fn render(&self, document: &str) -> Result<Capture> {
        let page = self.pool.acquire().await?;

        // The page is released on every path, including timeout.
        let outcome = tokio::time::timeout(self.config.timeout, self.capture_on(&page, document)).await;
        self.pool.release(page).await;

        match outcome {
            Ok(capture) => {
                debug!("page captured");
                capture
            }
            Err(_) => Err(EvalError::RenderTimeout(self.config.timeout.as_secs()).into()),
        }
    }
}
