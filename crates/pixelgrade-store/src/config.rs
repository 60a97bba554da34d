//! Configuration and store factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use pixelgrade_core::parser::load_challenge_directory;
use pixelgrade_core::traits::{ChallengeStore, SubmissionStore};
use pixelgrade_core::worker::WorkerConfig;

use crate::fs::FsStore;
use crate::http::HttpStore;
use crate::memory::MemoryStore;

/// Environment variable that overrides the HTTP store token.
pub const API_TOKEN_ENV: &str = "PIXELGRADE_API_TOKEN";

/// Which store backs challenges and submissions.
///
/// Note: Custom Debug impl masks the API token to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Memory {
        /// Challenges to preload.
        #[serde(default)]
        challenges_dir: Option<PathBuf>,
    },
    Fs {
        #[serde(default = "default_fs_root")]
        root: PathBuf,
        /// Defaults to `<root>/challenges`.
        #[serde(default)]
        challenges_dir: Option<PathBuf>,
    },
    Http {
        base_url: String,
        #[serde(default)]
        api_token: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreConfig::Memory { challenges_dir } => f
                .debug_struct("Memory")
                .field("challenges_dir", challenges_dir)
                .finish(),
            StoreConfig::Fs {
                root,
                challenges_dir,
            } => f
                .debug_struct("Fs")
                .field("root", root)
                .field("challenges_dir", challenges_dir)
                .finish(),
            StoreConfig::Http {
                base_url,
                api_token,
                timeout_secs,
            } => f
                .debug_struct("Http")
                .field("base_url", base_url)
                .field("api_token", &api_token.as_ref().map(|_| "***"))
                .field("timeout_secs", timeout_secs)
                .finish(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Fs {
            root: default_fs_root(),
            challenges_dir: None,
        }
    }
}

fn default_fs_root() -> PathBuf {
    PathBuf::from("./pixelgrade-data")
}

/// `[worker]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_max_concurrent() -> usize {
    2
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl WorkerSection {
    pub fn to_worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_concurrent: self.max_concurrent,
        }
    }
}

/// `[render]` section. Converted to a render configuration by the caller.
///
/// The viewport is fixed so every worker diffs on the same pixel grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSection {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,
    /// Where candidate, expected and diff screenshots are written.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_settle_ms() -> u64 {
    250
}
fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("./pixelgrade-data/screenshots")
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            settle_ms: default_settle_ms(),
            chrome_executable: None,
            artifacts_dir: default_artifacts_dir(),
        }
    }
}

/// Top-level pixelgrade configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PixelgradeConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub render: RenderSection,
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
///
/// Substituted values are copied verbatim and never rescanned.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + end];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

fn resolve_path(path: &Path) -> PathBuf {
    PathBuf::from(resolve_env_vars(&path.to_string_lossy()))
}

/// Resolve env vars in a store config.
fn resolve_store_config(config: &StoreConfig) -> StoreConfig {
    match config {
        StoreConfig::Memory { challenges_dir } => StoreConfig::Memory {
            challenges_dir: challenges_dir.as_deref().map(resolve_path),
        },
        StoreConfig::Fs {
            root,
            challenges_dir,
        } => StoreConfig::Fs {
            root: resolve_path(root),
            challenges_dir: challenges_dir.as_deref().map(resolve_path),
        },
        StoreConfig::Http {
            base_url,
            api_token,
            timeout_secs,
        } => StoreConfig::Http {
            base_url: resolve_env_vars(base_url),
            api_token: api_token
                .as_deref()
                .map(resolve_env_vars)
                .filter(|t| !t.is_empty()),
            timeout_secs: *timeout_secs,
        },
    }
}

/// Apply the token override, then resolve `${VAR}` references.
fn finish_config(mut config: PixelgradeConfig, token_override: Option<String>) -> PixelgradeConfig {
    if let (Some(token), StoreConfig::Http { api_token, .. }) = (token_override, &mut config.store)
    {
        *api_token = Some(token);
    }
    config.store = resolve_store_config(&config.store);
    config.render.chrome_executable = config.render.chrome_executable.as_deref().map(resolve_path);
    config.render.artifacts_dir = resolve_path(&config.render.artifacts_dir);
    config
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `pixelgrade.toml` in the current directory
/// 2. `~/.config/pixelgrade/config.toml`
///
/// Environment variable override: `PIXELGRADE_API_TOKEN`.
pub fn load_config() -> Result<PixelgradeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<PixelgradeConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("pixelgrade.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<PixelgradeConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => PixelgradeConfig::default(),
    };

    Ok(finish_config(config, std::env::var(API_TOKEN_ENV).ok()))
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("pixelgrade"))
}

/// The two store roles, usually backed by the same instance.
#[derive(Clone)]
pub struct StoreHandles {
    pub challenges: Arc<dyn ChallengeStore>,
    pub submissions: Arc<dyn SubmissionStore>,
}

impl StoreHandles {
    fn shared<S: ChallengeStore + SubmissionStore + 'static>(store: S) -> Self {
        let store = Arc::new(store);
        Self {
            challenges: store.clone(),
            submissions: store,
        }
    }
}

/// Create the configured store.
pub fn create_store(config: &StoreConfig) -> Result<StoreHandles> {
    match config {
        StoreConfig::Memory { challenges_dir } => {
            let store = MemoryStore::new();
            if let Some(dir) = challenges_dir {
                for parsed in load_challenge_directory(dir)? {
                    store.insert_challenge(parsed.challenge)?;
                }
            }
            Ok(StoreHandles::shared(store))
        }
        StoreConfig::Fs {
            root,
            challenges_dir,
        } => {
            let mut store = FsStore::new(root.clone())?;
            if let Some(dir) = challenges_dir {
                store = store.with_challenges_dir(dir.clone());
            }
            Ok(StoreHandles::shared(store))
        }
        StoreConfig::Http {
            base_url,
            api_token,
            timeout_secs,
        } => Ok(StoreHandles::shared(HttpStore::new(
            base_url,
            api_token.clone(),
            *timeout_secs,
        )?)),
    }
}
