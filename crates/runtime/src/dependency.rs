//! Third-party artifact declarations attached to component types

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// One `group:artifact:version` coordinate a component needs at run time.
///
/// Equality and hashing ignore `optional`, so the same artifact declared
/// by two components collapses into one entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencySpec {
    pub group_id: Cow<'static, str>,
    pub artifact_id: Cow<'static, str>,
    pub version: Cow<'static, str>,
    #[serde(default)]
    pub optional: bool,
}

impl DependencySpec {
    pub const fn new(group_id: &'static str, artifact_id: &'static str, version: &'static str) -> Self {
        Self {
            group_id: Cow::Borrowed(group_id),
            artifact_id: Cow::Borrowed(artifact_id),
            version: Cow::Borrowed(version),
            optional: false,
        }
    }

    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// `group:artifact:version`
    pub fn full_name(&self) -> String {
        format!("{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }

    /// `artifact-version.jar`
    pub fn file_name(&self) -> String {
        format!("{}-{}.jar", self.artifact_id, self.version)
    }

    /// Repository-relative path: group dots become directories
    pub fn repository_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group_id.replace('.', "/"),
            self.artifact_id,
            self.version,
            self.file_name()
        )
    }
}

impl PartialEq for DependencySpec {
    fn eq(&self, other: &Self) -> bool {
        self.group_id == other.group_id
            && self.artifact_id == other.artifact_id
            && self.version == other.version
    }
}

impl Eq for DependencySpec {}

impl Hash for DependencySpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.group_id.hash(state);
        self.artifact_id.hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())?;
        if self.optional {
            f.write_str(" (optional)")?;
        }
        Ok(())
    }
}

impl FromStr for DependencySpec {
    type Err = Error;

    /// Parse `group:artifact:version[:optional]`
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        let (coords, optional) = match parts.as_slice() {
            [g, a, v] => ([*g, *a, *v], false),
            [g, a, v, "optional"] => ([*g, *a, *v], true),
            _ => {
                return Err(Error::parameter(
                    "dependency",
                    format!("'{s}' is not group:artifact:version[:optional]"),
                ))
            }
        };
        if coords.iter().any(|c| c.is_empty()) {
            return Err(Error::parameter("dependency", format!("'{s}' has an empty coordinate")));
        }
        Ok(Self {
            group_id: Cow::Owned(coords[0].to_string()),
            artifact_id: Cow::Owned(coords[1].to_string()),
            version: Cow::Owned(coords[2].to_string()),
            optional,
        })
    }
}
