//! Per-image configuration (`image.yaml`).
//!
//! The file is shared with other build stages, so keys this crate does not
//! consume are ignored. Keys it does consume are validated strictly and any
//! malformed value fails with [`Error::Config`] naming the key.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, IoContext, Result};

pub const DEFAULT_DISK_SIZE_GB: u64 = 10;

/// Largest `size` whose byte count still fits in a `u64`.
pub const MAX_DISK_SIZE_GB: u64 = u64::MAX >> 30;

/// Boot partition filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootfsType {
    #[default]
    Ext4,
    Ext4Verity,
}

impl BootfsType {
    pub fn as_str(self) -> &'static str {
        match self {
            BootfsType::Ext4 => "ext4",
            BootfsType::Ext4Verity => "ext4verity",
        }
    }

    pub fn is_verity(self) -> bool {
        self == BootfsType::Ext4Verity
    }
}

/// Root partition filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootfsType {
    #[default]
    Xfs,
    Ext4Verity,
    Luks,
}

impl RootfsType {
    pub fn as_str(self) -> &'static str {
        match self {
            RootfsType::Xfs => "xfs",
            RootfsType::Ext4Verity => "ext4verity",
            RootfsType::Luks => "luks",
        }
    }
}

/// `luks_rootfs` is written either as a YAML boolean or as `"yes"`/`"no"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum YesNo {
    Bool(bool),
    Word(String),
}

impl YesNo {
    fn enabled(&self) -> Result<bool> {
        match self {
            YesNo::Bool(b) => Ok(*b),
            YesNo::Word(word) => match word.trim().to_ascii_lowercase().as_str() {
                "yes" | "true" => Ok(true),
                "no" | "false" => Ok(false),
                other => Err(Error::config(
                    "luks_rootfs",
                    format!("expected yes or no, got '{other}'"),
                )),
            },
        }
    }
}

/// `image.yaml` as written. Not `deny_unknown_fields`: other stages own
/// the remaining keys.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ImageYaml {
    bootfs: Option<BootfsType>,
    rootfs: Option<RootfsType>,
    luks_rootfs: Option<YesNo>,
    size: Option<u64>,
    #[serde(rename = "extra-kargs")]
    extra_kargs: Option<Vec<String>>,
    #[serde(rename = "ostree-remote")]
    ostree_remote: Option<String>,
    #[serde(rename = "save-var-subdirs-for-selabel-workaround")]
    save_var_subdirs: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageConfig {
    pub bootfs: BootfsType,
    pub rootfs: RootfsType,
    /// Disk size in GiB for configured-size image types.
    pub size_gb: u64,
    pub extra_kargs: Vec<String>,
    pub ostree_remote: Option<String>,
    pub save_var_subdirs: Option<Vec<String>>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            bootfs: BootfsType::default(),
            rootfs: RootfsType::default(),
            size_gb: DEFAULT_DISK_SIZE_GB,
            extra_kargs: Vec::new(),
            ostree_remote: None,
            save_var_subdirs: None,
        }
    }
}

impl ImageConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .io_context(|| format!("reading image configuration '{}'", path.display()))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        // An empty or comment-only file is an empty configuration.
        let doc: serde_yaml::Value = serde_yaml::from_str(text).map_err(yaml_error)?;
        if doc.is_null() {
            return Ok(ImageConfig::default());
        }
        let raw: ImageYaml = serde_yaml::from_str(text).map_err(yaml_error)?;

        // The deprecated boolean wins over `rootfs` when it is set.
        let luks = match &raw.luks_rootfs {
            Some(flag) => flag.enabled()?,
            None => false,
        };
        let rootfs = if luks {
            RootfsType::Luks
        } else {
            raw.rootfs.unwrap_or_default()
        };

        let size_gb = raw.size.unwrap_or(DEFAULT_DISK_SIZE_GB);
        if size_gb == 0 {
            return Err(Error::config("size", "must be greater than zero"));
        }
        if size_gb > MAX_DISK_SIZE_GB {
            return Err(Error::config(
                "size",
                format!("{size_gb} GiB exceeds the maximum of {MAX_DISK_SIZE_GB} GiB"),
            ));
        }

        Ok(ImageConfig {
            bootfs: raw.bootfs.unwrap_or_default(),
            rootfs,
            size_gb,
            extra_kargs: raw.extra_kargs.unwrap_or_default(),
            ostree_remote: raw.ostree_remote.map(|r| r.trim().to_string()),
            save_var_subdirs: raw.save_var_subdirs,
        })
    }

    /// Whether the shipped kernel must support fs-verity.
    pub fn requires_fs_verity(&self) -> bool {
        self.bootfs.is_verity() || self.rootfs == RootfsType::Ext4Verity
    }
}

/// Map a serde_yaml error to [`Error::Config`], keyed by the top-level key
/// in its path (`extra-kargs[0]` -> `extra-kargs`).
fn yaml_error(err: serde_yaml::Error) -> Error {
    let message = err.to_string();
    let key = message
        .split_once(": ")
        .map(|(path, _)| path)
        .filter(|path| !path.contains(char::is_whitespace))
        .map(|path| path.split(['[', '.']).next().unwrap_or(path))
        .filter(|key| !key.is_empty())
        .unwrap_or("<document>");
    Error::config(key, message.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = ImageConfig::parse("").unwrap();
        assert_eq!(config, ImageConfig::default());
        assert_eq!(config.size_gb, 10);
        assert!(!config.requires_fs_verity());
    }

    #[test]
    fn full_document() {
        let config = ImageConfig::parse(
            r#"
bootfs: ext4verity
rootfs: xfs
size: 16
extra-kargs:
  - mitigations=auto,nosmt
  - quiet
ostree-remote: fedora
save-var-subdirs-for-selabel-workaround:
  - lib/systemd
  - lib/nfs
vmware-os-type: fedora64Guest
"#,
        )
        .unwrap();
        assert_eq!(config.bootfs, BootfsType::Ext4Verity);
        assert_eq!(config.rootfs, RootfsType::Xfs);
        assert_eq!(config.size_gb, 16);
        assert_eq!(config.extra_kargs, vec!["mitigations=auto,nosmt", "quiet"]);
        assert_eq!(config.ostree_remote.as_deref(), Some("fedora"));
        assert_eq!(
            config.save_var_subdirs,
            Some(vec!["lib/systemd".to_string(), "lib/nfs".to_string()])
        );
        assert!(config.requires_fs_verity());
    }

    #[test]
    fn deprecated_luks_flag_takes_precedence() {
        let config = ImageConfig::parse("luks_rootfs: \"yes\"\nrootfs: xfs\n").unwrap();
        assert_eq!(config.rootfs, RootfsType::Luks);

        let config = ImageConfig::parse("luks_rootfs: false\nrootfs: ext4verity\n").unwrap();
        assert_eq!(config.rootfs, RootfsType::Ext4Verity);
        assert!(config.requires_fs_verity());
    }

    #[test]
    fn malformed_values_name_the_key() {
        let cases = [
            ("bootfs: btrfs\n", "bootfs"),
            ("rootfs: zfs\n", "rootfs"),
            ("size: big\n", "size"),
            ("size: 0\n", "size"),
            ("extra-kargs: quiet\n", "extra-kargs"),
            ("luks_rootfs: maybe\n", "luks_rootfs"),
            ("ostree-remote: [a]\n", "ostree-remote"),
        ];
        for (doc, expected) in cases {
            match ImageConfig::parse(doc) {
                Err(Error::Config { key, .. }) => assert_eq!(key, expected, "doc: {doc}"),
                other => panic!("expected config error for {doc}, got {other:?}"),
            }
        }
    }

    #[test]
    fn comment_only_document_uses_defaults() {
        let config = ImageConfig::parse("# nothing configured yet\n").unwrap();
        assert_eq!(config, ImageConfig::default());
    }

    #[test]
    fn unrepresentable_size_is_rejected() {
        match ImageConfig::parse("size: 20000000000\n") {
            Err(Error::Config { key, .. }) => assert_eq!(key, "size"),
            other => panic!("expected config error, got {other:?}"),
        }
        let max = format!("size: {MAX_DISK_SIZE_GB}\n");
        assert_eq!(ImageConfig::parse(&max).unwrap().size_gb, MAX_DISK_SIZE_GB);
    }

    #[test]
    fn non_mapping_document_is_rejected() {
        assert!(matches!(
            ImageConfig::parse("- a\n- b\n"),
            Err(Error::Config { .. })
        ));
    }
}
