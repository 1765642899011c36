//! End-to-end image build for one build, architecture and image type.
//!
//! Stages run strictly in order, each consuming the previous one's output:
//!
//! ```text
//! locate build -> lock -> load meta.json -> idempotency gate
//!   -> host tools -> image.yaml -> BuildContext
//!   -> resolve commit -> plan size -> boot params
//!   -> sandboxed assembly -> publish
//! ```
//!
//! Any failure aborts the run. Nothing is retried; re-running is safe because
//! the gate skips builds that already record the image.

use std::path::PathBuf;

use crate::arch::Arch;
use crate::build::{locate_build, BuildContext, BuildLock, BuildMeta, BuildSelector, Workdir};
use crate::commit::{resolve_commit, CommitInspector};
use crate::disk::{assemble_disk, build_boot_params, plan_disk_size, SandboxExecutor, SizeEstimator};
use crate::error::{Error, Stage, StageContext, StageError};
use crate::image::{ImageConfig, ImageType};
use crate::preflight;
use crate::publish::{publish, Published};
use crate::settings::Settings;

/// What to build.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub workdir: PathBuf,
    pub build: BuildSelector,
    pub arch: Arch,
    pub image_type: ImageType,
    pub settings: Settings,
    /// Verify the configured host tools exist once the gate has passed.
    pub check_host_tools: bool,
}

/// External collaborators, injected so they can be swapped in tests.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub sandbox: &'a dyn SandboxExecutor,
    pub estimator: &'a dyn SizeEstimator,
    pub inspector: &'a dyn CommitInspector,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The image was already recorded; nothing was done.
    AlreadyBuilt { path: PathBuf },
    Built(Published),
}

pub fn run(request: &BuildRequest, services: Services<'_>) -> Result<Outcome, StageError> {
    let workdir = Workdir::new(&request.workdir);

    let build = locate_build(&workdir.builds_dir(), &request.build, request.arch)
        .stage(Stage::Metadata)?;
    let _lock = BuildLock::acquire(&workdir.locks_dir(), &build.id, request.arch)
        .stage(Stage::Metadata)?;
    let meta_path = build.dir.join(crate::build::meta::META_FILENAME);
    let meta = BuildMeta::load(&meta_path).stage(Stage::Metadata)?;
    check_basearch(&meta, request.arch, &meta_path).stage(Stage::Metadata)?;

    if meta.has_image(request.image_type) {
        let path = meta
            .image(request.image_type)
            .map(|e| build.dir.join(e.path))
            .unwrap_or_else(|| build.dir.clone());
        tracing::info!(
            build = %build.id,
            image_type = %request.image_type,
            "image already built, nothing to do"
        );
        return Ok(Outcome::AlreadyBuilt { path });
    }

    if request.check_host_tools {
        preflight::check_host_tools(&request.settings).stage(Stage::Preflight)?;
    }

    let image_config = ImageConfig::load(&request.settings.image_config_path(workdir.root()))
        .stage(Stage::Configuration)?;
    request
        .image_type
        .ensure_supported_on(request.arch)
        .stage(Stage::Configuration)?;

    let ctx = BuildContext::new(
        workdir,
        build,
        request.arch,
        meta,
        request.image_type,
        image_config,
        request.settings.clone(),
    );
    tracing::info!(
        build = %ctx.build_id,
        arch = %ctx.arch,
        image_type = %ctx.image_type,
        "building image"
    );

    let resolved = resolve_commit(&ctx).stage(Stage::CommitResolution)?;
    let plan = plan_disk_size(&ctx, &resolved, services.estimator).stage(Stage::SizePlanning)?;
    let boot = build_boot_params(&ctx, &resolved, services.inspector).stage(Stage::BootParameters)?;
    let artifact = assemble_disk(&ctx, &resolved, &plan, &boot, services.sandbox)
        .stage(Stage::DiskAssembly)?;
    let published = publish(&ctx, artifact).stage(Stage::Publish)?;

    Ok(Outcome::Built(published))
}

fn check_basearch(meta: &BuildMeta, arch: Arch, meta_path: &std::path::Path) -> Result<(), Error> {
    match meta.basearch.as_deref() {
        Some(recorded) if recorded != arch.as_str() => Err(Error::metadata(
            meta_path,
            format!("build is for {recorded}, not {arch}"),
        )),
        _ => Ok(()),
    }
}
