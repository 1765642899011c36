//! Per-build metadata record (`meta.json`).
//!
//! Only the fields this pipeline reads are typed; everything else round-trips
//! untouched through `extra` so merging an image entry never drops data
//! written by other stages.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::arch::Arch;
use crate::error::{Error, IoContext, Result};
use crate::image::ImageType;

pub const META_FILENAME: &str = "meta.json";

/// Key under `images` holding the archived commit tarball.
pub const COMMIT_ARCHIVE_KEY: &str = "ostree";

/// A published image: path is relative to the build directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub path: String,
    pub sha256: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildMeta {
    pub name: String,
    pub buildid: String,
    #[serde(rename = "ostree-commit")]
    pub ostree_commit: String,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(
        rename = "coreos-assembler.basearch",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub basearch: Option<String>,
    #[serde(default)]
    pub images: BTreeMap<String, serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl BuildMeta {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).io_context(|| format!("reading build metadata '{}'", path.display()))?;
        let meta: BuildMeta =
            serde_json::from_slice(&bytes).map_err(|e| Error::metadata(path, e.to_string()))?;
        if !is_commit_hash(&meta.ostree_commit) {
            return Err(Error::metadata(
                path,
                format!("ostree-commit '{}' is not a sha256 hash", meta.ostree_commit),
            ));
        }
        Ok(meta)
    }

    /// Whether `image_type` already has a non-null entry.
    pub fn has_image(&self, image_type: ImageType) -> bool {
        self.images
            .get(image_type.as_str())
            .is_some_and(|v| !v.is_null())
    }

    pub fn image(&self, image_type: ImageType) -> Option<ImageEntry> {
        self.images
            .get(image_type.as_str())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// A copy of this record with `entry` recorded under `image_type`.
    pub fn with_image(&self, image_type: ImageType, entry: &ImageEntry) -> Result<Self> {
        let value = serde_json::to_value(entry)
            .map_err(|e| Error::metadata(META_FILENAME, e.to_string()))?;
        let mut updated = self.clone();
        updated.images.insert(image_type.as_str().to_string(), value);
        Ok(updated)
    }

    /// File name of the archived commit tarball, relative to the build directory.
    pub fn commit_archive(&self, arch: Arch) -> String {
        self.images
            .get(COMMIT_ARCHIVE_KEY)
            .and_then(|v| v.get("path"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}-ostree.{}.tar", self.name, self.buildid, arch))
    }

    /// File name of the disk image for `image_type`.
    pub fn image_filename(&self, image_type: ImageType, arch: Arch) -> String {
        format!(
            "{}-{}-{}.{}.{}",
            self.name,
            self.buildid,
            image_type,
            arch,
            image_type.disk_format().as_str()
        )
    }

    pub fn to_pretty_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::metadata(META_FILENAME, e.to_string()))
    }
}

pub(crate) fn is_commit_hash(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}
