//! Image types and their on-disk formats.

use std::fmt;
use std::str::FromStr;

use crate::arch::Arch;
use crate::error::{Error, Result};

/// The kind of disk image to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    /// Bare-metal raw disk.
    Metal,
    /// s390x ECKD DASD raw disk.
    Dasd,
    /// QEMU/virt qcow2 disk.
    Qemu,
}

/// How the target disk size is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingMode {
    /// Payload estimate plus overhead.
    Estimated,
    /// Fixed size from image configuration.
    Configured,
}

impl ImageType {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageType::Metal => "metal",
            ImageType::Dasd => "dasd",
            ImageType::Qemu => "qemu",
        }
    }

    pub fn disk_format(self) -> DiskFormat {
        match self {
            ImageType::Metal | ImageType::Dasd => DiskFormat::Raw,
            ImageType::Qemu => DiskFormat::Qcow2,
        }
    }

    /// Ignition platform id. DASD boots like any other bare-metal disk.
    pub fn platform_id(self) -> &'static str {
        match self {
            ImageType::Metal | ImageType::Dasd => "metal",
            ImageType::Qemu => "qemu",
        }
    }

    pub fn sizing(self) -> SizingMode {
        match self {
            ImageType::Metal | ImageType::Dasd => SizingMode::Estimated,
            ImageType::Qemu => SizingMode::Configured,
        }
    }

    /// Reject image types that cannot be built for `arch`.
    pub fn ensure_supported_on(self, arch: Arch) -> Result<()> {
        if self == ImageType::Dasd && arch != Arch::S390x {
            return Err(Error::UnsupportedArchitecture {
                arch: arch.to_string(),
                reason: "dasd images can only be built for s390x".to_string(),
            });
        }
        Ok(())
    }
}

impl FromStr for ImageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "metal" => Ok(ImageType::Metal),
            "dasd" => Ok(ImageType::Dasd),
            "qemu" => Ok(ImageType::Qemu),
            other => Err(Error::UnsupportedImageType(other.to_string())),
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container format of the image file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskFormat {
    Raw,
    Qcow2,
}

impl DiskFormat {
    /// Name as understood by qemu (`format=`) and used as file extension.
    pub fn as_str(self) -> &'static str {
        match self {
            DiskFormat::Raw => "raw",
            DiskFormat::Qcow2 => "qcow2",
        }
    }
}

impl fmt::Display for DiskFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
