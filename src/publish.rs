//! Publishing a built image into its build directory.
//!
//! Two rename-style moves, artifact first:
//!
//! 1. the temporary image is renamed to its final build-relative name;
//! 2. an updated copy of `meta.json` is renamed over the original.
//!
//! The metadata copy is written before either move, so the only window
//! between the two renames is a crash, and a crash there leaves an image
//! that metadata does not yet mention. Metadata never names a missing file.
//! Both moves use `rename(2)` and never fall back to copying, which would
//! expose a half-written file. The image and the staged metadata are synced
//! before they are renamed, and the build directory after each rename, so
//! the ordering also holds across a power loss.

use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::build::meta::META_FILENAME;
use crate::build::{BuildContext, ImageEntry};
use crate::disk::TempArtifact;
use crate::error::{Error, IoContext, Result};

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub path: PathBuf,
    pub entry: ImageEntry,
}

pub fn publish(ctx: &BuildContext, artifact: TempArtifact) -> Result<Published> {
    let (sha256, size) = sha256_file(artifact.path())?;
    let entry = ImageEntry {
        path: ctx.image_filename(),
        sha256,
        size,
    };

    let updated = ctx.meta.with_image(ctx.image_type, &entry)?;
    let staged_meta = stage_metadata(&ctx.build_dir, &updated.to_pretty_json()?)?;

    let final_path = ctx.image_path();
    let moved = sync_file(artifact.path())
        .and_then(|()| fs::rename(artifact.path(), &final_path))
        .and_then(|()| sync_dir(&ctx.build_dir));
    if let Err(source) = moved {
        discard(&staged_meta);
        return Err(Error::Publish {
            path: final_path,
            source,
        });
    }
    artifact.persist();

    let meta_path = ctx.meta_path();
    let replaced = fs::rename(&staged_meta, &meta_path).and_then(|()| sync_dir(&ctx.build_dir));
    if let Err(source) = replaced {
        discard(&staged_meta);
        return Err(Error::Publish {
            path: meta_path,
            source,
        });
    }

    tracing::info!(
        path = %final_path.display(),
        sha256 = %entry.sha256,
        size = entry.size,
        "published image"
    );
    Ok(Published {
        path: final_path,
        entry,
    })
}

/// Write `contents` to a temporary sibling of `meta.json` and fsync it.
fn stage_metadata(build_dir: &Path, contents: &str) -> Result<PathBuf> {
    let tmp = build_dir.join(format!(".{META_FILENAME}.new"));
    let write = || -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()
    };
    write().map_err(|source| Error::Publish {
        path: tmp.clone(),
        source,
    })?;
    Ok(tmp)
}

fn sync_file(path: &Path) -> std::io::Result<()> {
    File::open(path)?.sync_all()
}

/// Persist directory entries (renames) in `dir`.
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove staged metadata");
    }
}

/// SHA-256 hex digest and byte size of a file.
pub fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let f = File::open(path).io_context(|| format!("opening '{}' for checksum", path.display()))?;
    let mut r = BufReader::new(f);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    let mut size = 0u64;
    loop {
        let n = r
            .read(&mut buf)
            .io_context(|| format!("reading '{}' for checksum", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Arch;
    use crate::build::{BuildMeta, LocatedBuild, Workdir};
    use crate::image::{ImageConfig, ImageType};
    use crate::settings::Settings;
    use tempfile::TempDir;

    const COMMIT: &str = "abababababababababababababababababababababababababababababababab";

    fn setup(root: &Path) -> BuildContext {
        let build_dir = root.join("builds/testbuild/x86_64");
        fs::create_dir_all(&build_dir).unwrap();
        fs::create_dir_all(root.join("tmp")).unwrap();
        let meta = BuildMeta {
            name: "fcos".into(),
            buildid: "testbuild".into(),
            ostree_commit: COMMIT.into(),
            reference: None,
            basearch: None,
            images: Default::default(),
            extra: Default::default(),
        };
        fs::write(build_dir.join(META_FILENAME), meta.to_pretty_json().unwrap()).unwrap();
        BuildContext::new(
            Workdir::new(root),
            LocatedBuild {
                id: "testbuild".into(),
                dir: build_dir,
            },
            Arch::X86_64,
            meta,
            ImageType::Metal,
            ImageConfig::default(),
            Settings::default(),
        )
    }

    fn temp_image(ctx: &BuildContext, contents: &[u8]) -> TempArtifact {
        let path = ctx.workdir.tmp_dir().join("img.partial");
        fs::write(&path, contents).unwrap();
        TempArtifact::new(path)
    }

    #[test]
    fn sha256_of_known_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("f");
        fs::write(&path, b"hello").unwrap();
        let (sha, size) = sha256_file(&path).unwrap();
        assert_eq!(
            sha,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(size, 5);
    }

    #[test]
    fn publishes_artifact_and_metadata() {
        let tmp = TempDir::new().unwrap();
        let ctx = setup(tmp.path());
        let temp_path = ctx.workdir.tmp_dir().join("img.partial");
        let published = publish(&ctx, temp_image(&ctx, b"disk")).unwrap();

        assert_eq!(published.path, ctx.image_path());
        assert_eq!(fs::read(&published.path).unwrap(), b"disk");
        assert!(!temp_path.exists());

        let meta = BuildMeta::load(&ctx.meta_path()).unwrap();
        assert_eq!(meta.image(ImageType::Metal), Some(published.entry.clone()));
        assert_eq!(published.entry.size, 4);
        assert!(!ctx.build_dir.join(".meta.json.new").exists());
    }

    #[test]
    fn failed_metadata_staging_publishes_nothing() {
        let tmp = TempDir::new().unwrap();
        let ctx = setup(tmp.path());
        // A directory where the staged metadata file should go.
        fs::create_dir_all(ctx.build_dir.join(".meta.json.new")).unwrap();
        let temp_path = ctx.workdir.tmp_dir().join("img.partial");

        let err = publish(&ctx, temp_image(&ctx, b"disk")).unwrap_err();
        assert!(matches!(err, Error::Publish { .. }));
        assert!(!ctx.image_path().exists());
        assert!(!temp_path.exists());
        assert!(!BuildMeta::load(&ctx.meta_path()).unwrap().has_image(ImageType::Metal));
    }

    #[test]
    fn failed_artifact_rename_leaves_metadata_untouched() {
        let tmp = TempDir::new().unwrap();
        let ctx = setup(tmp.path());
        // A non-empty directory occupying the final image path.
        fs::create_dir_all(ctx.image_path().join("blocker")).unwrap();

        let err = publish(&ctx, temp_image(&ctx, b"disk")).unwrap_err();
        assert!(matches!(err, Error::Publish { .. }));
        assert!(!BuildMeta::load(&ctx.meta_path()).unwrap().has_image(ImageType::Metal));
        assert!(!ctx.build_dir.join(".meta.json.new").exists());
    }

    #[test]
    fn failed_metadata_rename_leaves_image_unreferenced() {
        let tmp = TempDir::new().unwrap();
        let ctx = setup(tmp.path());
        // A non-empty directory where meta.json should be replaced.
        fs::remove_file(ctx.meta_path()).unwrap();
        fs::create_dir_all(ctx.meta_path().join("blocker")).unwrap();

        let err = publish(&ctx, temp_image(&ctx, b"disk")).unwrap_err();
        assert!(matches!(err, Error::Publish { ref path, .. } if *path == ctx.meta_path()));
        // The image made it into place, but no metadata names it.
        assert_eq!(fs::read(ctx.image_path()).unwrap(), b"disk");
        assert!(ctx.meta_path().join("blocker").is_dir());
        assert!(!ctx.build_dir.join(".meta.json.new").exists());
    }
}
