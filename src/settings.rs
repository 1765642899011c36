//! Builder settings (`diskimage-builder.toml` at the working directory root).
//!
//! Every field is optional; a missing file means all defaults.
//!
//! ```toml
//! [tools]
//! ostree = "ostree"
//! qemu_img = "qemu-img"
//! estimator = "estimate-commit-disk-size"
//! runvm = "runvm"
//!
//! [disk]
//! create_disk_script = "/usr/lib/diskimage-builder/create_disk.sh"
//! grub_script = "/usr/lib/diskimage-builder/grub.cfg"
//!
//! [paths]
//! image_config = "src/config/image.yaml"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, IoContext, Result};

pub const SETTINGS_FILENAME: &str = "diskimage-builder.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub tools: ToolSettings,
    pub disk: DiskSettings,
    pub paths: PathSettings,
}

/// External helper programs, by name or path.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolSettings {
    pub ostree: String,
    pub qemu_img: String,
    pub estimator: String,
    pub runvm: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ostree: "ostree".to_string(),
            qemu_img: "qemu-img".to_string(),
            estimator: "estimate-commit-disk-size".to_string(),
            runvm: "runvm".to_string(),
        }
    }
}

/// Paths handed to the sandboxed disk writer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiskSettings {
    pub create_disk_script: PathBuf,
    pub grub_script: PathBuf,
}

impl Default for DiskSettings {
    fn default() -> Self {
        Self {
            create_disk_script: PathBuf::from("/usr/lib/diskimage-builder/create_disk.sh"),
            grub_script: PathBuf::from("/usr/lib/diskimage-builder/grub.cfg"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathSettings {
    /// Per-image configuration, relative to the working directory.
    pub image_config: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            image_config: PathBuf::from("src/config/image.yaml"),
        }
    }
}

impl Settings {
    /// Load settings from `<workdir>/diskimage-builder.toml`, or defaults.
    pub fn load(workdir: &Path) -> Result<Self> {
        let path = workdir.join(SETTINGS_FILENAME);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)
            .io_context(|| format!("reading settings '{}'", path.display()))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(SETTINGS_FILENAME, e.to_string()))
    }

    /// Resolve the image configuration path against `workdir`.
    pub fn image_config_path(&self, workdir: &Path) -> PathBuf {
        if self.paths.image_config.is_absolute() {
            self.paths.image_config.clone()
        } else {
            workdir.join(&self.paths.image_config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.tools.ostree, "ostree");
        assert_eq!(
            settings.image_config_path(tmp.path()),
            tmp.path().join("src/config/image.yaml")
        );
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let settings = Settings::parse(
            r#"
[tools]
runvm = "/usr/local/bin/runvm"

[paths]
image_config = "/etc/image.yaml"
"#,
        )
        .unwrap();
        assert_eq!(settings.tools.runvm, "/usr/local/bin/runvm");
        assert_eq!(settings.tools.qemu_img, "qemu-img");
        assert_eq!(
            settings.image_config_path(Path::new("/work")),
            PathBuf::from("/etc/image.yaml")
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Settings::parse("[tools]\nqemu = \"x\"\n").unwrap_err();
        assert!(matches!(err, Error::Config { ref key, .. } if key == SETTINGS_FILENAME));
    }
}
