//! Lazily launched, shared headless browser.
//!
//! One Chromium process serves every render. It is started on the first
//! [`BrowserPool::acquire`] and each render gets its own page. A process that
//! has crashed or lost its connection is replaced on the next acquire.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct Launched {
    browser: Browser,
    handler: JoinHandle<()>,
}

/// Handle to the shared browser process.
pub struct BrowserPool {
    chrome_executable: Option<PathBuf>,
    state: Mutex<Option<Launched>>,
}

impl BrowserPool {
    pub fn new(chrome_executable: Option<PathBuf>) -> Self {
        Self {
            chrome_executable,
            state: Mutex::new(None),
        }
    }

    pub async fn is_launched(&self) -> bool {
        self.state.lock().await.is_some()
    }

    async fn launch(&self) -> Result<Launched> {
        let mut builder = BrowserConfig::builder().new_headless_mode().args(vec![
            "--disable-gpu",
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--hide-scrollbars",
            "--font-render-hinting=none",
        ]);
        if let Some(path) = &self.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("invalid browser configuration: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch headless browser")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        info!("headless browser launched");
        Ok(Launched { browser, handler })
    }

    /// Open a fresh blank page, launching the browser if needed.
    ///
    /// If the running browser is gone, it is relaunched once before giving up.
    /// Every page returned must be handed back to [`release`](Self::release).
    pub async fn acquire(&self) -> Result<Page> {
        let mut state = self.state.lock().await;
        if state.as_ref().is_some_and(|l| l.handler.is_finished()) {
            warn!("browser connection lost, relaunching");
            if let Some(dead) = state.take() {
                discard(dead).await;
            }
        }
        if state.is_none() {
            *state = Some(self.launch().await?);
        }
        let launched = state
            .as_ref()
            .context("browser state missing after launch")?;

        let opened = launched.browser.new_page("about:blank").await;
        let page = match opened {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, "failed to open page, relaunching browser");
                if let Some(dead) = state.take() {
                    discard(dead).await;
                }
                let launched = state.insert(self.launch().await?);
                launched
                    .browser
                    .new_page("about:blank")
                    .await
                    .context("failed to open browser page")?
            }
        };
        debug!("page acquired");
        Ok(page)
    }

    /// Close a page obtained from [`acquire`](Self::acquire).
    pub async fn release(&self, page: Page) {
        if let Err(e) = page.close().await {
            warn!(error = %e, "failed to close browser page");
        } else {
            debug!("page released");
        }
    }

    /// Close the browser process, if one was launched.
    pub async fn shutdown(&self) {
        let Some(mut launched) = self.state.lock().await.take() else {
            return;
        };
        if let Err(e) = launched.browser.close().await {
            warn!(error = %e, "failed to close browser");
        }
        if let Err(e) = launched.browser.wait().await {
            warn!(error = %e, "browser process did not exit cleanly");
        }
        launched.handler.abort();
        info!("headless browser shut down");
    }
}

/// Tear down a browser that is no longer usable.
async fn discard(mut launched: Launched) {
    if let Some(Err(e)) = launched.browser.kill().await {
        debug!(error = %e, "failed to kill browser process");
    }
    launched.handler.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pool_starts_without_a_browser() {
        let pool = BrowserPool::new(None);
        assert!(!pool.is_launched().await);
        // Nothing to shut down
        pool.shutdown().await;
        assert!(!pool.is_launched().await);
    }

    #[tokio::test]
    #[ignore = "requires a local Chromium"]
    async fn acquire_launches_once() {
        let pool = BrowserPool::new(None);
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert!(pool.is_launched().await);
        pool.release(a).await;
        pool.release(b).await;
        pool.shutdown().await;
        assert!(!pool.is_launched().await);
    }

    #[tokio::test]
    #[ignore = "requires a local Chromium"]
    async fn acquire_relaunches_after_browser_dies() {
        let pool = BrowserPool::new(None);
        let page = pool.acquire().await.unwrap();
        pool.release(page).await;

        {
            let mut state = pool.state.lock().await;
            let launched = state.as_mut().unwrap();
            launched.browser.kill().await.unwrap().unwrap();
        }

        let page = pool.acquire().await.unwrap();
        page.set_content("<p>back</p>").await.unwrap();
        pool.release(page).await;
        assert!(pool.is_launched().await);
        pool.shutdown().await;
    }
}
