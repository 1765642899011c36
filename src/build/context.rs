//! Working directory layout and the immutable per-invocation build context.

use std::path::{Path, PathBuf};

use crate::arch::Arch;
use crate::build::builds::LocatedBuild;
use crate::build::meta::{BuildMeta, META_FILENAME};
use crate::image::{ImageConfig, ImageType};
use crate::settings::Settings;

/// Well-known paths under the builder's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workdir {
    root: PathBuf,
}

impl Workdir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn builds_dir(&self) -> PathBuf {
        self.root.join("builds")
    }

    /// Scratch space; must share a filesystem with `builds/` so published
    /// files can be renamed into place.
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Long-lived shared commit cache.
    pub fn primary_repo(&self) -> PathBuf {
        self.tmp_dir().join("repo")
    }

    /// Invocation-local commit store, recreated on every run.
    ///
    /// Keyed by build and arch as well as image type: the build lock only
    /// serializes one build, so other builds may be resolving concurrently.
    pub fn scratch_repo(&self, build_id: &str, arch: Arch, image_type: ImageType) -> PathBuf {
        self.tmp_dir()
            .join(format!("{build_id}.{arch}.{image_type}-scratch-repo"))
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.tmp_dir().join("locks")
    }
}

/// Everything a stage needs to know about the build being extended.
///
/// Constructed once after metadata and configuration are loaded and passed by
/// reference to every later stage.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub workdir: Workdir,
    pub build_id: String,
    pub arch: Arch,
    pub build_dir: PathBuf,
    pub meta: BuildMeta,
    pub image_type: ImageType,
    pub image_config: ImageConfig,
    pub settings: Settings,
    /// Host page size, used as the filesystem block size for fs-verity.
    pub page_size: u64,
}

impl BuildContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workdir: Workdir,
        build: LocatedBuild,
        arch: Arch,
        meta: BuildMeta,
        image_type: ImageType,
        image_config: ImageConfig,
        settings: Settings,
    ) -> Self {
        Self {
            workdir,
            build_id: build.id,
            arch,
            build_dir: build.dir,
            meta,
            image_type,
            image_config,
            settings,
            page_size: host_page_size(),
        }
    }

    pub fn meta_path(&self) -> PathBuf {
        self.build_dir.join(META_FILENAME)
    }

    pub fn image_filename(&self) -> String {
        self.meta.image_filename(self.image_type, self.arch)
    }

    /// Final, build-relative location of the image.
    pub fn image_path(&self) -> PathBuf {
        self.build_dir.join(self.image_filename())
    }

    pub fn commit_archive_path(&self) -> PathBuf {
        self.build_dir.join(self.meta.commit_archive(self.arch))
    }

    pub fn scratch_repo(&self) -> PathBuf {
        self.workdir
            .scratch_repo(&self.build_id, self.arch, self.image_type)
    }
}

/// Host page size in bytes.
pub fn host_page_size() -> u64 {
    rustix::param::page_size() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workdir_layout() {
        let wd = Workdir::new("/srv/build");
        assert_eq!(wd.primary_repo(), PathBuf::from("/srv/build/tmp/repo"));
        assert_eq!(
            wd.scratch_repo("41.20261018.0", Arch::S390x, ImageType::Dasd),
            PathBuf::from("/srv/build/tmp/41.20261018.0.s390x.dasd-scratch-repo")
        );
        assert_eq!(wd.builds_dir(), PathBuf::from("/srv/build/builds"));
    }

    #[test]
    fn page_size_is_sane() {
        let size = host_page_size();
        assert!(size >= 4096);
        assert!(size.is_power_of_two());
    }
}
