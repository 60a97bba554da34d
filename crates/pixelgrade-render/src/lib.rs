//! pixelgrade-render — Headless rendering and visual comparison.
//!
//! Turns code triples into screenshots with a shared headless browser and
//! scores them with the pixel diff from `pixelgrade-core`.

pub mod artifacts;
pub mod browser;
pub mod capture;
pub mod comparer;
pub mod document;

use std::path::PathBuf;
use std::time::Duration;

pub use artifacts::ArtifactStore;
pub use browser::BrowserPool;
pub use capture::{Capture, ChromeRenderer, PageRenderer};
pub use comparer::BrowserComparer;

/// Viewport every page is rendered at. Screenshots from different runs share
/// one pixel grid.
pub const VIEWPORT_WIDTH: u32 = 1280;
pub const VIEWPORT_HEIGHT: u32 = 720;

/// Default screenshot directory.
pub const DEFAULT_ARTIFACTS_DIR: &str = "./pixelgrade-data/screenshots";

/// Rendering parameters.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Upper bound on loading and capturing one page.
    pub timeout: Duration,
    /// Pause after the document loads, before the screenshot.
    pub settle: Duration,
    /// Browser binary; autodetected when unset.
    pub chrome_executable: Option<PathBuf>,
    /// Where candidate, expected and diff screenshots are written.
    pub artifacts_dir: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            settle: capture::DEFAULT_SETTLE,
            chrome_executable: None,
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
        }
    }
}
