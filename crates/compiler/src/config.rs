//! Build configuration
//!
//! Configuration can be loaded from a TOML file and/or environment variables.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const WORKSPACE_ROOT_ENV: &str = "ETLFLOW_WORKSPACE_ROOT";
pub const CARGO_ENV: &str = "ETLFLOW_CARGO";
pub const CACHE_DIR_ENV: &str = "ETLFLOW_CACHE_DIR";
pub const REPOSITORY_URL_ENV: &str = "ETLFLOW_REPOSITORY_URL";
pub const QUEUE_CAPACITY_ENV: &str = "ETLFLOW_QUEUE_CAPACITY";

/// Cargo profile used for generated flows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildProfile {
    #[default]
    Release,
    Debug,
}

impl BuildProfile {
    /// Directory under the target dir that holds the binary
    pub fn dir_name(self) -> &'static str {
        match self {
            BuildProfile::Release => "release",
            BuildProfile::Debug => "debug",
        }
    }
}

/// Settings for the build orchestrator and dependency resolver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// etlflow checkout the generated crate takes its path dependencies from
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Toolchain executable
    #[serde(default = "default_cargo")]
    pub cargo: String,

    #[serde(default)]
    pub profile: BuildProfile,

    /// Shared target dir so repeated builds reuse compiled dependencies
    #[serde(default)]
    pub target_dir: Option<PathBuf>,

    /// Local artifact cache, laid out like the remote repository
    #[serde(default = "default_dependency_cache")]
    pub dependency_cache: PathBuf,

    #[serde(default = "default_repository_url")]
    pub repository_url: String,

    /// Download timeout per artifact
    #[serde(default = "default_download_timeout")]
    pub download_timeout_seconds: u64,

    /// Bounded queue size between workers
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Leave the scratch build directory in place
    #[serde(default)]
    pub keep_build_dir: bool,
}

fn default_workspace_root() -> PathBuf {
    // crates/compiler -> workspace root
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_cargo() -> String {
    "cargo".to_string()
}

fn default_dependency_cache() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".etlflow")
        .join("cache")
}

fn default_repository_url() -> String {
    "https://repo1.maven.org/maven2".to_string()
}

fn default_download_timeout() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    etlflow_runtime::context::DEFAULT_QUEUE_CAPACITY
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            cargo: default_cargo(),
            profile: BuildProfile::default(),
            target_dir: None,
            dependency_cache: default_dependency_cache(),
            repository_url: default_repository_url(),
            download_timeout_seconds: default_download_timeout(),
            queue_capacity: default_queue_capacity(),
            keep_build_dir: false,
        }
    }
}

impl BuildConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = BuildConfig::default();

        if let Ok(root) = std::env::var(WORKSPACE_ROOT_ENV) {
            config.workspace_root = PathBuf::from(root);
        }
        if let Ok(cargo) = std::env::var(CARGO_ENV) {
            config.cargo = cargo;
        }
        if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
            config.dependency_cache = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var(REPOSITORY_URL_ENV) {
            config.repository_url = url;
        }
        if let Ok(capacity) = std::env::var(QUEUE_CAPACITY_ENV) {
            if let Ok(c) = capacity.parse() {
                config.queue_capacity = c;
            }
        }

        config
    }

    /// Load configuration from file if it exists, otherwise from environment
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        if let Some(p) = path {
            if p.as_ref().exists() {
                return Self::from_file(p);
            }
        }
        Ok(Self::from_env())
    }
}
