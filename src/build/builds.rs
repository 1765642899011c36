//! Build directory resolution.
//!
//! Layout: `<workdir>/builds/builds.json` lists builds newest first, and each
//! build owns `<workdir>/builds/<id>/<arch>/meta.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::arch::Arch;
use crate::build::meta::META_FILENAME;
use crate::error::{Error, IoContext, Result};

pub const BUILDS_INDEX_FILENAME: &str = "builds.json";

/// Which build to operate on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildSelector {
    Latest,
    Id(String),
}

impl BuildSelector {
    pub fn parse(value: &str) -> Self {
        match value {
            "latest" => BuildSelector::Latest,
            id => BuildSelector::Id(id.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BuildsIndex {
    #[serde(default)]
    builds: Vec<BuildsIndexEntry>,
}

#[derive(Debug, Deserialize)]
struct BuildsIndexEntry {
    id: String,
    #[serde(default)]
    arches: Vec<String>,
}

/// A located build directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedBuild {
    pub id: String,
    pub dir: PathBuf,
}

/// Resolve `selector` to a build directory containing `meta.json`.
pub fn locate_build(builds_dir: &Path, selector: &BuildSelector, arch: Arch) -> Result<LocatedBuild> {
    let not_found = |build_id: &str| Error::BuildNotFound {
        build_id: build_id.to_string(),
        arch: arch.to_string(),
        builds_dir: builds_dir.to_path_buf(),
    };

    let id = match selector {
        BuildSelector::Id(id) => {
            if !is_safe_segment(id) {
                return Err(not_found(id));
            }
            id.clone()
        }
        BuildSelector::Latest => latest_build_id(builds_dir, arch)?.ok_or_else(|| not_found("latest"))?,
    };

    let dir = builds_dir.join(&id).join(arch.as_str());
    if !dir.join(META_FILENAME).is_file() {
        return Err(not_found(&id));
    }
    Ok(LocatedBuild { id, dir })
}

/// Newest build in `builds.json` that lists `arch`.
fn latest_build_id(builds_dir: &Path, arch: Arch) -> Result<Option<String>> {
    let index_path = builds_dir.join(BUILDS_INDEX_FILENAME);
    if !index_path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(&index_path)
        .io_context(|| format!("reading builds index '{}'", index_path.display()))?;
    let index: BuildsIndex =
        serde_json::from_slice(&bytes).map_err(|e| Error::metadata(&index_path, e.to_string()))?;

    Ok(index
        .builds
        .into_iter()
        .find(|b| b.arches.iter().any(|a| a == arch.as_str()))
        .map(|b| b.id))
}

fn is_safe_segment(s: &str) -> bool {
    !s.is_empty() && !s.contains('/') && !s.contains('\\') && s != "." && s != ".."
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_build(builds: &Path, id: &str, arch: &str) {
        let dir = builds.join(id).join(arch);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(META_FILENAME), "{}").unwrap();
    }

    #[test]
    fn explicit_id() {
        let tmp = TempDir::new().unwrap();
        make_build(tmp.path(), "testbuild", "x86_64");
        let found = locate_build(tmp.path(), &BuildSelector::parse("testbuild"), Arch::X86_64).unwrap();
        assert_eq!(found.id, "testbuild");
        assert_eq!(found.dir, tmp.path().join("testbuild/x86_64"));
    }

    #[test]
    fn missing_build_is_not_found() {
        let tmp = TempDir::new().unwrap();
        make_build(tmp.path(), "testbuild", "x86_64");
        for selector in ["nope", "../testbuild", "latest"] {
            let err = locate_build(tmp.path(), &BuildSelector::parse(selector), Arch::X86_64).unwrap_err();
            assert!(matches!(err, Error::BuildNotFound { .. }), "{selector}");
        }
        let err = locate_build(tmp.path(), &BuildSelector::parse("testbuild"), Arch::S390x).unwrap_err();
        assert!(matches!(err, Error::BuildNotFound { .. }));
    }

    #[test]
    fn latest_picks_newest_with_arch() {
        let tmp = TempDir::new().unwrap();
        make_build(tmp.path(), "b2", "aarch64");
        make_build(tmp.path(), "b1", "x86_64");
        fs::write(
            tmp.path().join(BUILDS_INDEX_FILENAME),
            r#"{"schema-version":"1.0.0","builds":[
                {"id":"b2","arches":["aarch64"]},
                {"id":"b1","arches":["x86_64","aarch64"]}
            ]}"#,
        )
        .unwrap();
        let found = locate_build(tmp.path(), &BuildSelector::Latest, Arch::X86_64).unwrap();
        assert_eq!(found.id, "b1");
        let found = locate_build(tmp.path(), &BuildSelector::Latest, Arch::Aarch64).unwrap();
        assert_eq!(found.id, "b2");
    }
}
