//! Error taxonomy for the disk image pipeline.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("build '{build_id}' for arch {arch} not found under {}", builds_dir.display())]
    BuildNotFound {
        build_id: String,
        arch: String,
        builds_dir: PathBuf,
    },

    #[error("invalid image configuration key '{key}': {reason}")]
    Config { key: String, reason: String },

    #[error(
        "commit {commit} is not available in any commit store and no archive exists at {}",
        archive.display()
    )]
    ArchiveMissing { commit: String, archive: PathBuf },

    #[error("unsupported architecture '{arch}': {reason}")]
    UnsupportedArchitecture { arch: String, reason: String },

    #[error("unsupported image type '{0}' (expected one of: metal, dasd, qemu)")]
    UnsupportedImageType(String),

    #[error("kernel in commit {commit} does not enable {flag} ({})", config_path)]
    UnsupportedKernelConfig {
        commit: String,
        flag: String,
        config_path: String,
    },

    #[error("disk assembly failed: {reason}")]
    DiskAssemblyFailed { reason: String },

    #[error("failed to publish {}", path.display())]
    Publish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed data in {}: {reason}", path.display())]
    Metadata { path: PathBuf, reason: String },

    #[error("{tool}: {reason}")]
    Tool { tool: String, reason: String },

    #[error("build is locked by another invocation: {}", path.display())]
    Locked { path: PathBuf },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn config(key: &str, reason: impl Into<String>) -> Self {
        Error::Config {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn metadata(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Metadata {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Attach a human readable context to `io::Error`s.
pub(crate) trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| Error::Io {
            context: f().into(),
            source,
        })
    }
}

/// Pipeline stage, used to name the failing step in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Metadata,
    Preflight,
    Configuration,
    CommitResolution,
    SizePlanning,
    BootParameters,
    DiskAssembly,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Metadata => "build metadata",
            Stage::Preflight => "host preflight",
            Stage::Configuration => "image configuration",
            Stage::CommitResolution => "commit resolution",
            Stage::SizePlanning => "disk size planning",
            Stage::BootParameters => "boot parameters",
            Stage::DiskAssembly => "disk assembly",
            Stage::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// A pipeline failure tagged with the stage it happened in.
#[derive(Debug, Error)]
#[error("{stage} stage: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

/// Tag a stage result with its [`Stage`].
pub(crate) trait StageContext<T> {
    fn stage(self, stage: Stage) -> std::result::Result<T, StageError>;
}

impl<T> StageContext<T> for Result<T> {
    fn stage(self, stage: Stage) -> std::result::Result<T, StageError> {
        self.map_err(|source| StageError { stage, source })
    }
}
