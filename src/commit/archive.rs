//! Extraction of archived commit tarballs into a scratch repository.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{IoContext, Result};

/// Unpack `archive` (plain tar, or `.tar.zst`) into a freshly created `dest`.
///
/// Any previous contents of `dest` are removed first so state from an earlier
/// run can never leak into this one.
pub fn extract_commit_archive(archive: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        fs::remove_dir_all(dest)
            .io_context(|| format!("removing stale scratch repository '{}'", dest.display()))?;
    }
    fs::create_dir_all(dest)
        .io_context(|| format!("creating scratch repository '{}'", dest.display()))?;

    let file = File::open(archive)
        .io_context(|| format!("opening commit archive '{}'", archive.display()))?;
    let reader: Box<dyn Read> = if is_zstd(archive) {
        Box::new(
            zstd::stream::Decoder::new(file)
                .io_context(|| format!("decoding commit archive '{}'", archive.display()))?,
        )
    } else {
        Box::new(BufReader::new(file))
    };

    let mut tar = tar::Archive::new(reader);
    tar.set_preserve_permissions(true);
    tar.unpack(dest).io_context(|| {
        format!(
            "unpacking commit archive '{}' into '{}'",
            archive.display(),
            dest.display()
        )
    })?;

    tracing::debug!(archive = %archive.display(), dest = %dest.display(), "extracted commit archive");
    Ok(())
}

fn is_zstd(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "zst")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_tar(path: &Path, compress: bool) {
        let file = File::create(path).unwrap();
        let mut payload = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut payload);
            let data = b"[core]\nrepo_version=1\n";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, "config", &data[..]).unwrap();
            builder.finish().unwrap();
        }
        if compress {
            zstd::stream::copy_encode(&payload[..], file, 3).unwrap();
        } else {
            std::io::copy(&mut &payload[..], &mut &file).unwrap();
        }
    }

    #[test]
    fn extracts_plain_tar_into_fresh_dir() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("commit.tar");
        write_tar(&archive, false);

        let dest = tmp.path().join("scratch");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale"), "old").unwrap();

        extract_commit_archive(&archive, &dest).unwrap();
        assert!(dest.join("config").is_file());
        assert!(!dest.join("stale").exists());
    }

    #[test]
    fn extracts_zstd_tar() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("commit.tar.zst");
        write_tar(&archive, true);
        let dest = tmp.path().join("scratch");
        extract_commit_archive(&archive, &dest).unwrap();
        assert_eq!(
            fs::read_to_string(dest.join("config")).unwrap(),
            "[core]\nrepo_version=1\n"
        );
    }
}
