//! Per-build advisory lock.
//!
//! Held from the idempotency gate through publish so two invocations against
//! the same build cannot both pass the gate and race their metadata merges.
//! The lock covers the whole build, not one image type, because every image
//! type rewrites the same `meta.json`.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::arch::Arch;
use crate::error::{Error, IoContext, Result};

/// RAII guard: the lock is released when the file handle is dropped.
#[derive(Debug)]
pub struct BuildLock {
    file: File,
    path: PathBuf,
}

impl BuildLock {
    /// Try to take the exclusive lock for `build_id`/`arch`, failing fast
    /// with [`Error::Locked`] if another process holds it.
    pub fn acquire(locks_dir: &Path, build_id: &str, arch: Arch) -> Result<Self> {
        fs::create_dir_all(locks_dir)
            .io_context(|| format!("creating lock directory '{}'", locks_dir.display()))?;
        let path = locks_dir.join(format!("{build_id}.{arch}.lock"));

        // Lock files are never unlinked: removing a still-locked file would let a
        // second process lock a fresh inode at the same path.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .io_context(|| format!("opening lock file '{}'", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            return Err(Error::Locked { path });
        }

        tracing::debug!(path = %path.display(), "acquired build lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
