//! Bundle loader and runner
//!
//! Opens a bundle, unpacks it and any nested dependency archives into a
//! scratch directory, checks the flow binary's entry point against this
//! host, and runs it as a child process inside the layered loading
//! context: bundle first, then nested dependencies, then the host.

use crate::bundle::{self, Manifest, FLOW_BINARY, FLOW_CLASS, FLOW_SHA256, MAIN_CLASS};
use crate::error::{Error, Result};
use etlflow_runtime::launcher::{EXIT_CONTEXT_MISMATCH, FLOW_CLASS_ENV, LAUNCHER_ID, QUEUE_CAPACITY_ENV};
use etlflow_runtime::loading::{BUNDLE_DIR_ENV, LIB_PATH_ENV};
use etlflow_runtime::{FlowDescriptor, LoadingContext};
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

/// Archive kinds recognised under `lib/`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NestedArchive {
    Zip,
    Tar,
}

impl NestedArchive {
    fn detect(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "jar" | "zip" => Some(NestedArchive::Zip),
            "tar" => Some(NestedArchive::Tar),
            _ => None,
        }
    }
}

/// A bundle whose manifest has been read and checked
#[derive(Debug)]
pub struct BundleLoader {
    path: PathBuf,
    manifest: Manifest,
}

impl BundleLoader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|e| Error::Load(format!("cannot open bundle {path:?}: {e}")))?;
        let mut archive = tar::Archive::new(file);

        let mut text = None;
        let entries = archive
            .entries()
            .map_err(|e| Error::Load(format!("{path:?} is not a bundle: {e}")))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| Error::Load(format!("corrupt bundle {path:?}: {e}")))?;
            let is_manifest = entry
                .path()
                .map(|p| p == Path::new(bundle::MANIFEST_PATH))
                .unwrap_or(false);
            if is_manifest {
                let mut buf = String::new();
                entry
                    .read_to_string(&mut buf)
                    .map_err(|e| Error::Load(format!("unreadable manifest: {e}")))?;
                text = Some(buf);
                break;
            }
        }
        let text = text.ok_or_else(|| {
            Error::Load(format!("{path:?} has no {}", bundle::MANIFEST_PATH))
        })?;

        let manifest = Manifest::parse(&text)?;
        let main_class = manifest.require(MAIN_CLASS)?;
        if main_class != LAUNCHER_ID {
            return Err(Error::Load(format!(
                "unsupported {MAIN_CLASS} '{main_class}', expected '{LAUNCHER_ID}'"
            )));
        }
        manifest.require(FLOW_CLASS)?;
        let binary = manifest.require(FLOW_BINARY)?;
        if !is_contained(Path::new(binary)) {
            return Err(Error::Load(format!("{FLOW_BINARY} '{binary}' escapes the bundle")));
        }
        manifest.require(FLOW_SHA256)?;

        debug!("Opened bundle {:?}: {}", path, manifest.render().trim_end());
        Ok(Self { path, manifest })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn flow_class(&self) -> &str {
        self.manifest.get(FLOW_CLASS).unwrap_or_default()
    }

    /// Unpack the bundle and its nested dependency archives
    pub fn extract(&self) -> Result<ExtractedBundle> {
        let dir = tempfile::Builder::new()
            .prefix("etlflow-run-")
            .tempdir()?;

        let file = File::open(&self.path)?;
        tar::Archive::new(file)
            .unpack(dir.path())
            .map_err(|e| Error::Load(format!("cannot unpack {:?}: {e}", self.path)))?;

        let binary = dir.path().join(self.manifest.require(FLOW_BINARY)?);
        if !binary.is_file() {
            return Err(Error::Load(format!("flow binary {binary:?} is missing from the bundle")));
        }
        let expected = self.manifest.require(FLOW_SHA256)?;
        let actual = bundle::sha256_file(&binary)?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(Error::Load(format!(
                "flow binary checksum mismatch: manifest {expected}, actual {actual}"
            )));
        }
        make_executable(&binary)?;

        let lib_root = dir.path().join(bundle::LIB_DIR);
        let mut lib_dirs = Vec::new();
        if lib_root.is_dir() {
            lib_dirs.push(lib_root.clone());
            extract_nested(&lib_root, &mut lib_dirs)?;
        }

        info!(
            "Extracted {} to {:?} ({} dependency dirs)",
            self.flow_class(),
            dir.path(),
            lib_dirs.len()
        );
        Ok(ExtractedBundle {
            dir,
            flow_class: self.flow_class().to_string(),
            binary,
            lib_dirs,
        })
    }
}

fn is_contained(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Unpack every archive in `dir` into `dir/<stem>/`, recursing into the
/// unpacked trees. Directories are pushed in sorted order.
fn extract_nested(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut archives: Vec<(PathBuf, NestedArchive)> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter_map(|p| NestedArchive::detect(&p).map(|kind| (p, kind)))
        .collect();
    archives.sort_by(|a, b| a.0.cmp(&b.0));

    for (archive, kind) in archives {
        let stem = archive
            .file_stem()
            .ok_or_else(|| Error::Load(format!("nested archive {archive:?} has no name")))?;
        let target = dir.join(stem);
        std::fs::create_dir_all(&target)?;

        let file = File::open(&archive)?;
        match kind {
            NestedArchive::Zip => zip::ZipArchive::new(file)
                .and_then(|mut zip| zip.extract(&target))
                .map_err(|e| Error::Load(format!("corrupt nested archive {archive:?}: {e}")))?,
            NestedArchive::Tar => tar::Archive::new(file)
                .unpack(&target)
                .map_err(|e| Error::Load(format!("corrupt nested archive {archive:?}: {e}")))?,
        }
        debug!("Unpacked nested archive {:?}", archive);

        out.push(target.clone());
        extract_nested(&target, out)?;
    }
    Ok(())
}

/// An unpacked bundle; the scratch directory is removed on drop
#[derive(Debug)]
pub struct ExtractedBundle {
    dir: TempDir,
    flow_class: String,
    binary: PathBuf,
    lib_dirs: Vec<PathBuf>,
}

impl ExtractedBundle {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn flow_class(&self) -> &str {
        &self.flow_class
    }

    /// Nested dependency directories, bundle order
    pub fn lib_dirs(&self) -> &[PathBuf] {
        &self.lib_dirs
    }

    /// The context the flow process will see
    pub fn loading_context(&self) -> LoadingContext {
        LoadingContext::for_bundle(self.root(), &self.lib_dirs)
    }

    /// Ask the binary for its entry point and check it against this host
    pub async fn describe(&self) -> Result<FlowDescriptor> {
        let output = Command::new(&self.binary)
            .arg("--describe")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Load(format!("cannot start {:?}: {e}", self.binary)))?;
        if !output.status.success() {
            return Err(Error::Load(format!(
                "{:?} --describe exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let descriptor: FlowDescriptor = serde_json::from_slice(&output.stdout).map_err(|e| {
            Error::ContextMismatch(format!("binary does not describe an etlflow entry point: {e}"))
        })?;
        self.verify(&descriptor)?;
        Ok(descriptor)
    }

    /// Check a descriptor against the manifest and host runtime
    pub fn verify(&self, descriptor: &FlowDescriptor) -> Result<()> {
        descriptor.verify(&self.flow_class)?;
        Ok(())
    }

    /// Run the flow with stdio inherited
    pub async fn run(&self, queue_capacity: Option<usize>, verbose: bool) -> Result<()> {
        let lib_path = std::env::join_paths(&self.lib_dirs)
            .map_err(|e| Error::Load(format!("invalid dependency path: {e}")))?;

        let mut cmd = Command::new(&self.binary);
        cmd.env(BUNDLE_DIR_ENV, self.root())
            .env(LIB_PATH_ENV, lib_path)
            .env(FLOW_CLASS_ENV, &self.flow_class)
            .current_dir(std::env::current_dir()?)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(capacity) = queue_capacity {
            cmd.env(QUEUE_CAPACITY_ENV, capacity.to_string());
        }
        if verbose {
            cmd.arg("--verbose");
        }

        info!("Running {}", self.flow_class);
        let status = cmd
            .status()
            .await
            .map_err(|e| Error::Load(format!("cannot start {:?}: {e}", self.binary)))?;

        match status.code() {
            Some(0) => Ok(()),
            Some(EXIT_CONTEXT_MISMATCH) => Err(Error::ContextMismatch(format!(
                "{} refused the loading context prepared by this host",
                self.flow_class
            ))),
            _ => Err(Error::Runtime(format!("{} exited with {}", self.flow_class, status))),
        }
    }
}

/// Open, extract, check and run a bundle
pub async fn run_bundle(path: impl AsRef<Path>, queue_capacity: Option<usize>, verbose: bool) -> Result<()> {
    let loader = BundleLoader::open(path)?;
    let extracted = loader.extract()?;
    extracted.describe().await?;
    extracted.run(queue_capacity, verbose).await
}
