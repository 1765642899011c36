//! How the target image is attached inside the sandbox VM.

use std::path::{Path, PathBuf};

use crate::image::{DiskFormat, ImageType};

/// Block size used to emulate ECKD DASD geometry.
pub const DASD_BLOCK_SIZE: u32 = 4096;

/// Device node the target disk appears as inside the sandbox.
pub const TARGET_DEVICE: &str = "/dev/vda";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveBus {
    /// Generic virtio block device.
    Virtio,
    /// virtio-blk on the s390x channel subsystem.
    VirtioCcw,
}

/// The image file as a block device of the sandbox VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDrive {
    pub path: PathBuf,
    pub format: DiskFormat,
    pub bus: DriveBus,
    /// Explicit physical and logical block size, if overridden.
    pub block_size: Option<u32>,
}

impl TargetDrive {
    pub fn for_image(image_type: ImageType, path: &Path) -> Self {
        let format = image_type.disk_format();
        let dasd = image_type == ImageType::Dasd && format == DiskFormat::Raw;
        Self {
            path: path.to_path_buf(),
            format,
            bus: if dasd {
                DriveBus::VirtioCcw
            } else {
                DriveBus::Virtio
            },
            block_size: dasd.then_some(DASD_BLOCK_SIZE),
        }
    }

    /// QEMU arguments attaching this drive.
    pub fn qemu_args(&self) -> Vec<String> {
        let file = self.path.display();
        match self.bus {
            DriveBus::Virtio => vec![
                "-drive".to_string(),
                format!(
                    "if=virtio,id=target,format={},file={},cache=unsafe",
                    self.format, file
                ),
            ],
            DriveBus::VirtioCcw => {
                let mut device = "virtio-blk-ccw,drive=target".to_string();
                if let Some(bs) = self.block_size {
                    device.push_str(&format!(",physical_block_size={bs},logical_block_size={bs}"));
                }
                device.push_str(",scsi=off");
                vec![
                    "-drive".to_string(),
                    format!("if=none,id=target,format={},file={},cache=unsafe", self.format, file),
                    "-device".to_string(),
                    device,
                ]
            }
        }
    }
}
