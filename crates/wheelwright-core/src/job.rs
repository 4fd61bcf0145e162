//! Pending builds and the jobs handed out to workers.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// One row of eligible work from the catalog: a package version that has not
/// been built for an ABI and is not marked to be skipped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{package} {version} ({abi_tag})")]
pub struct PendingBuild {
    /// Binary compatibility class the build targets.
    pub abi_tag: String,
    /// Package name.
    pub package: String,
    /// Package version.
    pub version: String,
}

impl PendingBuild {
    pub fn new(
        abi_tag: impl Into<String>,
        package: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            abi_tag: abi_tag.into(),
            package: package.into(),
            version: version.into(),
        }
    }
}

/// The job a worker receives for a build. The ABI is implied by the request
/// that asked for it.
impl From<PendingBuild> for BuildJob {
    fn from(build: PendingBuild) -> Self {
        Self {
            package: build.package,
            version: build.version,
        }
    }
}

/// A (package, version) pair sent to a worker.
///
/// Travels as a two element array so the reply is either `["pkg", "1.0"]` or
/// `null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(from = "(String, String)", into = "(String, String)")]
#[display("{package} {version}")]
pub struct BuildJob {
    pub package: String,
    pub version: String,
}

impl BuildJob {
    pub fn new(package: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
        }
    }
}

impl From<(String, String)> for BuildJob {
    fn from((package, version): (String, String)) -> Self {
        Self { package, version }
    }
}

impl From<BuildJob> for (String, String) {
    fn from(job: BuildJob) -> Self {
        (job.package, job.version)
    }
}
