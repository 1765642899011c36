//! Minimal read/ref access to an on-disk OSTree repository.
//!
//! Only the parts of the layout the resolver needs are touched:
//! `refs/heads/<ref>`, `refs/remotes/<remote>/<ref>` and
//! `objects/<xx>/<rest>.commit`. Content is never read here; see
//! [`super::inspect`] for that.

use std::fs;
use std::path::{Path, PathBuf};

use crate::build::meta::is_commit_hash;
use crate::error::{Error, IoContext, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OstreeRepo {
    path: PathBuf,
}

impl OstreeRepo {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory looks like a repository at all.
    pub fn exists(&self) -> bool {
        self.path.join("config").is_file() && self.path.join("objects").is_dir()
    }

    fn commit_object_path(&self, hash: &str) -> PathBuf {
        self.path
            .join("objects")
            .join(&hash[..2])
            .join(format!("{}.commit", &hash[2..]))
    }

    pub fn has_commit(&self, hash: &str) -> bool {
        is_commit_hash(hash) && self.commit_object_path(hash).is_file()
    }

    /// Resolve a ref (or a full commit hash) to a commit hash.
    ///
    /// Local heads win over remote refs. Returns `Ok(None)` when nothing by
    /// that name exists.
    pub fn rev_parse(&self, reference: &str) -> Result<Option<String>> {
        if is_commit_hash(reference) {
            return Ok(self.has_commit(reference).then(|| reference.to_string()));
        }
        if !is_valid_ref(reference) {
            return Ok(None);
        }

        let head = self.path.join("refs/heads").join(reference);
        if head.is_file() {
            return read_ref_file(&head).map(Some);
        }

        let remotes = self.path.join("refs/remotes");
        if remotes.is_dir() {
            let mut entries = fs::read_dir(&remotes)
                .io_context(|| format!("reading '{}'", remotes.display()))?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .collect::<Vec<_>>();
            entries.sort();
            for remote in entries {
                let candidate = remote.join(reference);
                if candidate.is_file() {
                    return read_ref_file(&candidate).map(Some);
                }
            }
        }

        Ok(None)
    }

    /// Point local head `reference` at `hash`, replacing any previous value.
    pub fn set_ref(&self, reference: &str, hash: &str) -> Result<()> {
        if !is_valid_ref(reference) {
            return Err(Error::metadata(&self.path, format!("invalid ref name '{reference}'")));
        }
        if !is_commit_hash(hash) {
            return Err(Error::metadata(&self.path, format!("invalid commit hash '{hash}'")));
        }

        let path = self.path.join("refs/heads").join(reference);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .io_context(|| format!("creating ref directory '{}'", parent.display()))?;
        }
        let leaf = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = path.with_file_name(format!(".{leaf}.tmp"));
        fs::write(&tmp, format!("{hash}\n"))
            .io_context(|| format!("writing ref '{}'", tmp.display()))?;
        fs::rename(&tmp, &path).io_context(|| format!("updating ref '{}'", path.display()))?;
        Ok(())
    }
}

fn read_ref_file(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path).io_context(|| format!("reading ref '{}'", path.display()))?;
    let hash = raw.trim();
    if !is_commit_hash(hash) {
        return Err(Error::metadata(path, format!("ref does not contain a commit hash: '{hash}'")));
    }
    Ok(hash.to_string())
}

fn is_valid_ref(reference: &str) -> bool {
    !reference.is_empty()
        && !reference.starts_with('/')
        && !reference.ends_with('/')
        && !reference.chars().any(char::is_whitespace)
        && reference.split('/').all(|part| !part.is_empty() && part != "." && part != "..")
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// Lay out an empty repository with one commit object and optional head.
    pub(crate) fn fake_repo(path: &Path, commit: &str, head: Option<&str>) -> OstreeRepo {
        fs::create_dir_all(path.join("objects").join(&commit[..2])).unwrap();
        fs::create_dir_all(path.join("refs/heads")).unwrap();
        fs::write(path.join("config"), "[core]\nrepo_version=1\nmode=archive-z2\n").unwrap();
        fs::write(
            path.join("objects")
                .join(&commit[..2])
                .join(format!("{}.commit", &commit[2..])),
            b"commit",
        )
        .unwrap();
        let repo = OstreeRepo::open(path);
        if let Some(head) = head {
            repo.set_ref(head, commit).unwrap();
        }
        repo
    }
}
