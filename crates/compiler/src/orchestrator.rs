//! Build orchestrator
//!
//! Sheet in, bundle out: validate and plan the flow, resolve the
//! dependencies its components declare, generate its crate into a scratch
//! directory, build it with cargo and package everything into one bundle.

use crate::bundle::{self, BundleContents};
use crate::config::{BuildConfig, BuildProfile};
use crate::dependencies::{DependencyResolver, ResolvedDependencies};
use crate::error::{Error, Result};
use crate::generator::{self, numbered_listing, GeneratedArtifact, COMPILER_VERSION};
use crate::graph::PipelineGraph;
use crate::plan::FlowPlan;
use etlflow_components::ComponentRegistry;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// What a successful compile produced
#[derive(Debug)]
pub struct BuildOutput {
    pub bundle_path: PathBuf,
    pub flow_class: String,
    pub resolved: ResolvedDependencies,
    pub warnings: Vec<String>,
    /// Scratch build directory, when it was kept
    pub build_dir: Option<PathBuf>,
}

pub struct BuildOrchestrator {
    config: BuildConfig,
    registry: ComponentRegistry,
    verbose: bool,
}

impl BuildOrchestrator {
    pub fn new(config: BuildConfig, registry: ComponentRegistry) -> Self {
        Self {
            config,
            registry,
            verbose: false,
        }
    }

    /// Include the line-numbered generated source in build errors
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Compile `graph` into a bundle at `output`
    pub async fn compile(&self, graph: &PipelineGraph, output: &Path) -> Result<BuildOutput> {
        info!("Compiling flow '{}' ({} nodes)", graph.id, graph.node_count());

        // Structural and generation errors surface before any toolchain work
        let plan = FlowPlan::build(graph, &self.registry)?;
        let artifact = generator::generate_from_plan(&plan, &self.config)?;
        let resolved = self.resolve_dependencies(&artifact).await?;

        let scratch = tempfile::Builder::new()
            .prefix("etlflow-build-")
            .keep(self.config.keep_build_dir)
            .tempdir()?;
        debug!("Build directory: {:?}", scratch.path());

        let crate_dir = scratch.path().join(&artifact.package_name);
        artifact.write_to(&crate_dir)?;

        let binary = self.cargo_build(&artifact, &crate_dir, scratch.path()).await?;

        let contents = BundleContents {
            flow_class: artifact.flow_class.clone(),
            created_by: format!("etlflow flow compiler {COMPILER_VERSION}"),
            binary,
            binary_name: artifact.bin_name.clone(),
            source: artifact.source.clone(),
            libraries: resolved.paths().map(Path::to_path_buf).collect(),
        };
        bundle::write_bundle(output, &contents)?;

        let mut warnings = artifact.warnings.clone();
        warnings.extend(
            resolved
                .skipped_optional
                .iter()
                .map(|spec| format!("optional dependency {} was not bundled", spec.full_name())),
        );

        let build_dir = self.config.keep_build_dir.then(|| scratch.path().to_path_buf());
        if let Some(dir) = &build_dir {
            info!("Keeping build directory {:?}", dir);
        }

        Ok(BuildOutput {
            bundle_path: output.to_path_buf(),
            flow_class: artifact.flow_class,
            resolved,
            warnings,
            build_dir,
        })
    }

    async fn cargo_build(
        &self,
        artifact: &GeneratedArtifact,
        crate_dir: &Path,
        scratch: &Path,
    ) -> Result<PathBuf> {
        let target_dir = self
            .config
            .target_dir
            .clone()
            .unwrap_or_else(|| scratch.join("target"));

        let mut cmd = Command::new(&self.config.cargo);
        cmd.arg("build")
            .arg("--manifest-path")
            .arg(crate_dir.join("Cargo.toml"))
            .arg("--target-dir")
            .arg(&target_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if self.config.profile == BuildProfile::Release {
            cmd.arg("--release");
        }

        info!("Building {} with {}", artifact.package_name, self.config.cargo);
        let output = cmd.output().await.map_err(|e| {
            Error::Build(format!("failed to run '{}': {e}", self.config.cargo))
        })?;

        if !output.status.success() {
            let mut diagnostics = String::from_utf8_lossy(&output.stderr).into_owned();
            if self.verbose {
                diagnostics.push_str("\n\nGenerated src/main.rs:\n");
                diagnostics.push_str(&numbered_listing(&artifact.source));
            }
            return Err(Error::Build(diagnostics));
        }

        let binary = target_dir
            .join(self.config.profile.dir_name())
            .join(format!("{}{}", artifact.bin_name, std::env::consts::EXE_SUFFIX));
        if !binary.is_file() {
            return Err(Error::Build(format!(
                "cargo reported success but {binary:?} does not exist"
            )));
        }
        debug!("Built {:?}", binary);
        Ok(binary)
    }

    async fn resolve_dependencies(
        &self,
        artifact: &GeneratedArtifact,
    ) -> Result<ResolvedDependencies> {
        if artifact.dependencies.is_empty() {
            return Ok(ResolvedDependencies::default());
        }
        let resolver = DependencyResolver::new(&self.config)?;
        let resolved = resolver.resolve(&artifact.dependencies).await?;
        for spec in &resolved.skipped_optional {
            warn!("Bundle for {} will not include {}", artifact.flow_class, spec);
        }
        Ok(resolved)
    }
}
