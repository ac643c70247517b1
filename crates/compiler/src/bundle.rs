//! Bundle format
//!
//! A bundle is a tar archive:
//!
//! ```text
//! META-INF/MANIFEST.MF   Key: Value attributes
//! bin/<name>             compiled flow binary
//! src/main.rs            generated source, for inspection
//! lib/<file>             resolved dependency archives
//! ```
//!
//! Entries are written in that order with zeroed timestamps so that
//! rebuilding the same flow yields the same archive layout.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
pub const BIN_DIR: &str = "bin";
pub const LIB_DIR: &str = "lib";
pub const SOURCE_PATH: &str = "src/main.rs";

pub const MANIFEST_VERSION: &str = "Manifest-Version";
pub const MAIN_CLASS: &str = "Main-Class";
pub const FLOW_CLASS: &str = "Flow-Class";
pub const CREATED_BY: &str = "Created-By";
pub const FLOW_BINARY: &str = "Flow-Binary";
pub const FLOW_SHA256: &str = "Flow-Sha256";

/// Ordered `Key: Value` attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<(String, String)>,
}

impl Manifest {
    pub fn new() -> Self {
        let mut manifest = Self::default();
        manifest.set(MANIFEST_VERSION, "1.0");
        manifest
    }

    /// Set `key`, replacing an existing value in place
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Like [`get`](Self::get), but a missing or empty attribute is a load error
    pub fn require(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(Error::Load(format!("manifest is missing '{key}'"))),
        }
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Parse manifest text. A line starting with a single space continues
    /// the previous value.
    pub fn parse(text: &str) -> Result<Self> {
        let mut manifest = Self::default();
        for (i, raw) in text.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            if let Some(continued) = line.strip_prefix(' ') {
                match manifest.entries.last_mut() {
                    Some((_, value)) => value.push_str(continued),
                    None => {
                        return Err(Error::Load(format!(
                            "manifest line {} continues nothing",
                            i + 1
                        )))
                    }
                }
                continue;
            }
            let (key, value) = line.split_once(':').ok_or_else(|| {
                Error::Load(format!("manifest line {} is not 'Key: Value': {line}", i + 1))
            })?;
            manifest.set(key.trim(), value.trim());
        }
        Ok(manifest)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        out
    }
}

/// Hex sha256 of a file
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Everything that goes into a bundle
#[derive(Debug, Clone)]
pub struct BundleContents {
    pub flow_class: String,
    pub created_by: String,
    pub binary: PathBuf,
    /// Name under `bin/`
    pub binary_name: String,
    pub source: String,
    pub libraries: Vec<PathBuf>,
}

fn append_bytes<W: Write>(
    builder: &mut tar::Builder<W>,
    path: &str,
    mode: u32,
    data: &[u8],
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(mode);
    header.set_mtime(0);
    builder.append_data(&mut header, path, data)?;
    Ok(())
}

fn append_file<W: Write>(
    builder: &mut tar::Builder<W>,
    path: &str,
    mode: u32,
    source: &Path,
) -> Result<()> {
    let mut file = File::open(source)?;
    let mut header = tar::Header::new_gnu();
    header.set_size(file.metadata()?.len());
    header.set_mode(mode);
    header.set_mtime(0);
    builder.append_data(&mut header, path, &mut file)?;
    Ok(())
}

/// Write a bundle to `path` and return its manifest
pub fn write_bundle(path: &Path, contents: &BundleContents) -> Result<Manifest> {
    let binary_entry = format!("{BIN_DIR}/{}", contents.binary_name);

    let mut manifest = Manifest::new();
    manifest.set(MAIN_CLASS, etlflow_runtime::launcher::LAUNCHER_ID);
    manifest.set(FLOW_CLASS, contents.flow_class.as_str());
    manifest.set(CREATED_BY, contents.created_by.as_str());
    manifest.set(FLOW_BINARY, binary_entry.as_str());
    manifest.set(FLOW_SHA256, sha256_file(&contents.binary)?);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut builder = tar::Builder::new(BufWriter::new(File::create(path)?));

    append_bytes(&mut builder, MANIFEST_PATH, 0o644, manifest.render().as_bytes())?;
    append_file(&mut builder, &binary_entry, 0o755, &contents.binary)?;
    append_bytes(&mut builder, SOURCE_PATH, 0o644, contents.source.as_bytes())?;
    for lib in &contents.libraries {
        let name = lib
            .file_name()
            .ok_or_else(|| Error::Build(format!("dependency path {lib:?} has no file name")))?;
        append_file(
            &mut builder,
            &format!("{LIB_DIR}/{}", name.to_string_lossy()),
            0o644,
            lib,
        )?;
    }

    builder.into_inner()?.flush()?;
    tracing::info!("Wrote bundle {:?} ({})", path, contents.flow_class);
    Ok(manifest)
}
