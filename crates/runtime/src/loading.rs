//! Layered loading context for a running bundle
//!
//! A compiled flow runs inside a context built by the loader: the extracted
//! bundle directory first, then each nested dependency directory, then the
//! host. Lookups always walk the layers in that order.

use std::path::{Path, PathBuf};

/// Environment variable naming the extracted bundle directory
pub const BUNDLE_DIR_ENV: &str = "ETLFLOW_BUNDLE_DIR";
/// Environment variable listing nested dependency directories, bundle order
pub const LIB_PATH_ENV: &str = "ETLFLOW_LIB_PATH";

/// One layer of the loading context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadingLayer {
    /// Files shipped inside the bundle itself
    Bundle(PathBuf),
    /// An extracted nested dependency archive
    Dependency(PathBuf),
    /// The host: current directory and `PATH`
    Host,
}

impl LoadingLayer {
    fn lookup(&self, name: &str) -> Option<PathBuf> {
        match self {
            LoadingLayer::Bundle(dir) | LoadingLayer::Dependency(dir) => {
                let candidate = dir.join(name);
                candidate.exists().then_some(candidate)
            }
            LoadingLayer::Host => {
                let cwd = std::env::current_dir().ok().map(|d| d.join(name));
                if let Some(candidate) = cwd.filter(|c| c.exists()) {
                    return Some(candidate);
                }
                let path = std::env::var_os("PATH")?;
                std::env::split_paths(&path)
                    .map(|dir| dir.join(name))
                    .find(|candidate| candidate.exists())
            }
        }
    }
}

/// Ordered set of layers used to resolve resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadingContext {
    layers: Vec<LoadingLayer>,
}

impl LoadingContext {
    /// Host-only context, used when a flow runs outside of a bundle
    pub fn host() -> Self {
        Self {
            layers: vec![LoadingLayer::Host],
        }
    }

    /// Build a context for an extracted bundle and its nested dependency dirs
    pub fn for_bundle(bundle_dir: impl Into<PathBuf>, dependency_dirs: &[PathBuf]) -> Self {
        let mut layers = Vec::with_capacity(dependency_dirs.len() + 2);
        layers.push(LoadingLayer::Bundle(bundle_dir.into()));
        layers.extend(
            dependency_dirs
                .iter()
                .cloned()
                .map(LoadingLayer::Dependency),
        );
        layers.push(LoadingLayer::Host);
        Self { layers }
    }

    /// Build the context the loader handed to this process
    pub fn from_env() -> Self {
        let bundle = std::env::var_os(BUNDLE_DIR_ENV).map(PathBuf::from);
        let deps: Vec<PathBuf> = std::env::var_os(LIB_PATH_ENV)
            .map(|paths| std::env::split_paths(&paths).collect())
            .unwrap_or_default();

        match bundle {
            Some(dir) => Self::for_bundle(dir, &deps),
            None => {
                let mut layers: Vec<LoadingLayer> =
                    deps.into_iter().map(LoadingLayer::Dependency).collect();
                layers.push(LoadingLayer::Host);
                Self { layers }
            }
        }
    }

    pub fn layers(&self) -> &[LoadingLayer] {
        &self.layers
    }

    /// Dependency directories in precedence order
    pub fn dependency_dirs(&self) -> Vec<&Path> {
        self.layers
            .iter()
            .filter_map(|layer| match layer {
                LoadingLayer::Dependency(dir) => Some(dir.as_path()),
                _ => None,
            })
            .collect()
    }

    /// Resolve a relative resource name, first match wins
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        self.layers.iter().find_map(|layer| layer.lookup(name))
    }
}

impl Default for LoadingContext {
    fn default() -> Self {
        Self::host()
    }
}
