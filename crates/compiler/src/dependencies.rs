//! Component dependency resolution
//!
//! Every declared artifact is looked up in the local cache first, then in
//! any extra library directories, and only then downloaded from the remote
//! repository into the cache. A required artifact that cannot be found is
//! fatal; an optional one is skipped with a warning.

use crate::config::BuildConfig;
use crate::error::{Error, Result};
use etlflow_runtime::DependencySpec;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Outcome of resolving a set of declarations
#[derive(Debug, Default)]
pub struct ResolvedDependencies {
    /// Artifacts found or downloaded, declaration order
    pub resolved: Vec<(DependencySpec, PathBuf)>,
    /// Optional artifacts that could not be found
    pub skipped_optional: Vec<DependencySpec>,
}

impl ResolvedDependencies {
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.resolved.iter().map(|(_, path)| path.as_path())
    }
}

pub struct DependencyResolver {
    cache_dir: PathBuf,
    lib_dirs: Vec<PathBuf>,
    repository: Option<Url>,
    client: Client,
}

impl DependencyResolver {
    pub fn new(config: &BuildConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_seconds))
            .build()
            .map_err(|e| Error::Dependency(format!("failed to create HTTP client: {e}")))?;

        // Url::join drops the last segment unless the base ends with '/'
        let repository = if config.repository_url.is_empty() {
            None
        } else {
            let mut base = config.repository_url.clone();
            if !base.ends_with('/') {
                base.push('/');
            }
            Some(Url::parse(&base).map_err(|e| {
                Error::Config(format!("invalid repository url '{}': {e}", config.repository_url))
            })?)
        };

        Ok(Self {
            cache_dir: config.dependency_cache.clone(),
            lib_dirs: Vec::new(),
            repository,
            client,
        })
    }

    /// Also accept artifacts already present in `dir`, matched by file name
    pub fn with_lib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lib_dirs.push(dir.into());
        self
    }

    pub async fn resolve(&self, specs: &[DependencySpec]) -> Result<ResolvedDependencies> {
        let mut out = ResolvedDependencies::default();

        for spec in specs {
            match self.resolve_one(spec).await {
                Ok(path) => {
                    debug!("Resolved {} -> {:?}", spec.full_name(), path);
                    out.resolved.push((spec.clone(), path));
                }
                Err(e) if spec.optional => {
                    warn!("Skipping optional dependency {}: {}", spec.full_name(), e);
                    out.skipped_optional.push(spec.clone());
                }
                Err(e) => {
                    return Err(Error::Dependency(format!(
                        "required dependency {} could not be resolved: {}",
                        spec.full_name(),
                        e
                    )));
                }
            }
        }

        info!(
            "Resolved {} dependencies ({} optional skipped)",
            out.resolved.len(),
            out.skipped_optional.len()
        );
        Ok(out)
    }

    async fn resolve_one(&self, spec: &DependencySpec) -> std::result::Result<PathBuf, String> {
        let cached = self.cache_dir.join(spec.repository_path());
        if cached.is_file() {
            return Ok(cached);
        }

        let file_name = spec.file_name();
        if let Some(found) = self
            .lib_dirs
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
        {
            return Ok(found);
        }

        let Some(repository) = &self.repository else {
            return Err("not in cache and no repository configured".to_string());
        };
        let url = repository
            .join(&spec.repository_path())
            .map_err(|e| format!("bad artifact url: {e}"))?;
        self.download(&url, &cached).await?;
        Ok(cached)
    }

    async fn download(&self, url: &Url, dest: &Path) -> std::result::Result<(), String> {
        info!("Downloading {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| format!("request to {url} failed: {e}"))?;
        if !response.status().is_success() {
            return Err(format!("{url} returned {}", response.status()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| format!("reading {url} failed: {e}"))?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("cannot create {parent:?}: {e}"))?;
        }
        // Write then rename so a partial download never looks cached
        let partial = dest.with_extension("part");
        tokio::fs::write(&partial, &bytes)
            .await
            .map_err(|e| format!("cannot write {partial:?}: {e}"))?;
        tokio::fs::rename(&partial, dest)
            .await
            .map_err(|e| format!("cannot move {partial:?} into cache: {e}"))?;
        Ok(())
    }
}
