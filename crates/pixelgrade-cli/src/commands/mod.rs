//! Subcommand implementations.

pub mod evaluate;
pub mod init;
pub mod status;
pub mod submit;
pub mod validate;
pub mod worker;

use std::time::Duration;

use pixelgrade_render::RenderConfig;
use pixelgrade_store::config::RenderSection;

/// Map the `[render]` config section onto the renderer's settings.
pub fn render_config(section: &RenderSection) -> RenderConfig {
    RenderConfig {
        timeout: Duration::from_secs(section.timeout_secs),
        settle: Duration::from_millis(section.settle_ms),
        chrome_executable: section.chrome_executable.clone(),
        artifacts_dir: section.artifacts_dir.clone(),
    }
}
