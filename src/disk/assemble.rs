//! Image allocation and sandbox invocation.
//!
//! The image is built at a temporary path under `tmp/` and only becomes
//! visible at its final name through [`crate::publish`]. If anything fails
//! first, [`TempArtifact`] removes the partial file on drop.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::build::BuildContext;
use crate::commit::ResolvedCommit;
use crate::disk::device::{TargetDrive, TARGET_DEVICE};
use crate::disk::kargs::BootParams;
use crate::disk::sandbox::{AssemblyParams, SandboxExecutor};
use crate::disk::size::{DiskSize, SizePlan};
use crate::error::{Error, IoContext, Result};
use crate::image::DiskFormat;
use crate::process::Cmd;

/// RAII-managed unpublished image file.
///
/// Deleted on drop unless handed off with [`TempArtifact::persist`].
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    persisted: bool,
}

impl TempArtifact {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            persisted: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop managing the file; the caller now owns it.
    pub fn persist(mut self) -> PathBuf {
        self.persisted = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove partial image");
            }
        } else {
            tracing::debug!(path = %self.path.display(), "removed partial image");
        }
    }
}

/// Create an empty image of `size` at `path`.
///
/// Raw images are sparse files; qcow2 images are created with `qemu-img`.
pub fn allocate_image(path: &Path, format: DiskFormat, size: DiskSize, qemu_img: &str) -> Result<TempArtifact> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .io_context(|| format!("creating image directory '{}'", parent.display()))?;
    }
    if path.exists() {
        fs::remove_file(path)
            .io_context(|| format!("removing stale partial image '{}'", path.display()))?;
    }
    let artifact = TempArtifact::new(path.to_path_buf());

    match format {
        DiskFormat::Raw => {
            let bytes = size
                .bytes()
                .ok_or_else(|| Error::config("size", format!("{size} is too large for an image file")))?;
            let file = File::create(path)
                .io_context(|| format!("creating image '{}'", path.display()))?;
            file.set_len(bytes)
                .io_context(|| format!("sizing image '{}' to {size}", path.display()))?;
        }
        DiskFormat::Qcow2 => {
            Cmd::new(qemu_img)
                .args(["create", "-f", "qcow2"])
                .arg_path(path)
                .arg(size.to_string())
                .error_msg("creating qcow2 image")
                .run()?;
        }
    }

    Ok(artifact)
}

/// Temporary location of the image being built.
pub fn temp_image_path(ctx: &BuildContext) -> PathBuf {
    ctx.workdir
        .tmp_dir()
        .join(format!("{}.partial", ctx.image_filename()))
}

pub fn assembly_params(
    ctx: &BuildContext,
    resolved: &ResolvedCommit,
    plan: &SizePlan,
    boot: &BootParams,
    image_path: &Path,
) -> AssemblyParams {
    AssemblyParams {
        drive: TargetDrive::for_image(ctx.image_type, image_path),
        device: TARGET_DEVICE.to_string(),
        build_id: ctx.build_id.clone(),
        image_name: ctx.image_filename(),
        grub_script: ctx.settings.disk.grub_script.clone(),
        kargs: boot.kernel_cmdline(),
        os_name: ctx.meta.name.clone(),
        reference: resolved.reference.clone(),
        commit: resolved.commit.clone(),
        repo: resolved.repo.clone(),
        remote: ctx.image_config.ostree_remote.clone(),
        save_var_subdirs: ctx.image_config.save_var_subdirs.clone(),
        rootfs_size: plan.rootfs_size,
        rootfs: ctx.image_config.rootfs,
        boot_verity: ctx.image_config.bootfs.is_verity(),
    }
}

/// Allocate the image and have the sandbox write it.
pub fn assemble_disk(
    ctx: &BuildContext,
    resolved: &ResolvedCommit,
    plan: &SizePlan,
    boot: &BootParams,
    sandbox: &dyn SandboxExecutor,
) -> Result<TempArtifact> {
    let path = temp_image_path(ctx);
    let format = ctx.image_type.disk_format();
    let artifact = allocate_image(&path, format, plan.image_size, &ctx.settings.tools.qemu_img)?;
    tracing::info!(path = %path.display(), %format, size = %plan.image_size, "allocated image");

    let params = assembly_params(ctx, resolved, plan, boot, artifact.path());
    sandbox.run(&params)?;
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn raw_allocation_is_sparse_and_sized() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("tmp/img.raw.partial");
        let artifact = allocate_image(&path, DiskFormat::Raw, DiskSize::Megabytes(3213), "qemu-img").unwrap();
        assert_eq!(fs::metadata(artifact.path()).unwrap().len(), 3213 * 1024 * 1024);
    }

    #[test]
    fn temp_artifact_removed_on_drop() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("img.partial");
        {
            let _artifact = allocate_image(&path, DiskFormat::Raw, DiskSize::Megabytes(1), "qemu-img").unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn persisted_artifact_survives() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("img.partial");
        let artifact = allocate_image(&path, DiskFormat::Raw, DiskSize::Megabytes(1), "qemu-img").unwrap();
        let kept = artifact.persist();
        assert_eq!(kept, path);
        assert!(path.exists());
    }
}
