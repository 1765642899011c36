//! Disk size planning.
//!
//! Estimated types (metal, DASD) get the payload estimate plus filesystem
//! headroom plus a fixed allowance for the non-root partitions; the root
//! partition then grows into whatever is left. Configured types (qemu) take
//! the disk size from `image.yaml` and pin the root partition to the raw
//! payload estimate.

use std::fmt;
use std::path::Path;

use crate::build::BuildContext;
use crate::commit::ResolvedCommit;
use crate::error::{Error, Result};
use crate::image::SizingMode;
use crate::process::Cmd;

/// Headroom added to the payload estimate, in percent.
pub const OVERHEAD_PERCENT: u64 = 35;

/// Boot, EFI, BIOS and other non-payload partitions, in MiB.
pub const NON_PAYLOAD_MB: u64 = 513;

const MIB: u64 = 1024 * 1024;

/// A size with the unit suffix the disk tooling expects (`3213M`, `10G`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskSize {
    Megabytes(u64),
    Gigabytes(u64),
}

impl DiskSize {
    /// "No explicit size": the partition inherits the remaining space.
    pub const INHERIT: DiskSize = DiskSize::Megabytes(0);

    /// Size in bytes, or `None` if it does not fit in a `u64`.
    pub fn bytes(self) -> Option<u64> {
        match self {
            DiskSize::Megabytes(n) => n.checked_mul(MIB),
            DiskSize::Gigabytes(n) => n.checked_mul(1024 * MIB),
        }
    }

    pub fn is_zero(self) -> bool {
        matches!(self, DiskSize::Megabytes(0) | DiskSize::Gigabytes(0))
    }
}

impl fmt::Display for DiskSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            _ if self.is_zero() => f.write_str("0"),
            DiskSize::Megabytes(n) => write!(f, "{n}M"),
            DiskSize::Gigabytes(n) => write!(f, "{n}G"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePlan {
    pub image_size: DiskSize,
    pub rootfs_size: DiskSize,
}

/// Input to a payload size estimate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimateRequest<'a> {
    pub repo: &'a Path,
    pub reference: &'a str,
    /// Filesystem block size to assume, when it differs from the default.
    pub blocksize: Option<u64>,
}

/// Estimates the on-disk size of a commit's payload.
pub trait SizeEstimator {
    /// Estimated payload size in MiB, without headroom.
    fn estimate_mb(&self, request: &EstimateRequest<'_>) -> Result<u64>;
}

/// [`SizeEstimator`] backed by an external estimation tool.
///
/// Invoked as `<program> --repo <repo> [--blocksize <n>] <ref>`; the last
/// integer printed on stdout is the estimate in MiB.
#[derive(Debug, Clone)]
pub struct CommandEstimator {
    program: String,
}

impl CommandEstimator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl SizeEstimator for CommandEstimator {
    fn estimate_mb(&self, request: &EstimateRequest<'_>) -> Result<u64> {
        let mut cmd = Cmd::new(&self.program).arg("--repo").arg_path(request.repo);
        if let Some(blocksize) = request.blocksize {
            cmd = cmd.arg("--blocksize").arg(blocksize.to_string());
        }
        let result = cmd
            .arg(request.reference)
            .error_msg("estimating commit size")
            .run()?;
        parse_estimate(&result.stdout).ok_or_else(|| Error::Tool {
            tool: self.program.clone(),
            reason: format!("unparsable size estimate: '{}'", result.stdout.trim()),
        })
    }
}

fn parse_estimate(stdout: &str) -> Option<u64> {
    stdout
        .split_whitespace()
        .rev()
        .find_map(|tok| tok.trim_end_matches(['M', 'm']).parse::<u64>().ok())
}

/// Payload estimate plus headroom, rounded up. `None` on overflow.
pub fn with_overhead(payload_mb: u64) -> Option<u64> {
    payload_mb
        .checked_mul(100 + OVERHEAD_PERCENT)
        .map(|n| n.div_ceil(100))
}

pub fn plan_disk_size(
    ctx: &BuildContext,
    resolved: &ResolvedCommit,
    estimator: &dyn SizeEstimator,
) -> Result<SizePlan> {
    let blocksize = ctx
        .image_config
        .requires_fs_verity()
        .then_some(ctx.page_size);
    let request = EstimateRequest {
        repo: &resolved.repo,
        reference: &resolved.reference,
        blocksize,
    };
    let payload_mb = estimator.estimate_mb(&request)?;

    let too_large = |what: &str| Error::Tool {
        tool: ctx.settings.tools.estimator.clone(),
        reason: format!("{what} for a {payload_mb} MiB payload is not representable"),
    };

    let plan = match ctx.image_type.sizing() {
        SizingMode::Estimated => {
            let image_mb = with_overhead(payload_mb)
                .and_then(|mb| mb.checked_add(NON_PAYLOAD_MB))
                .ok_or_else(|| too_large("image size"))?;
            SizePlan {
                image_size: DiskSize::Megabytes(image_mb),
                rootfs_size: DiskSize::INHERIT,
            }
        }
        SizingMode::Configured => SizePlan {
            image_size: DiskSize::Gigabytes(ctx.image_config.size_gb),
            rootfs_size: DiskSize::Megabytes(payload_mb),
        },
    };
    if plan.image_size.bytes().is_none() {
        return Err(Error::config(
            "size",
            format!("{} does not fit in a 64-bit byte count", plan.image_size),
        ));
    }
    if plan.rootfs_size.bytes().is_none() {
        return Err(too_large("root partition size"));
    }

    tracing::info!(
        payload_mb,
        image_size = %plan.image_size,
        rootfs_size = %plan.rootfs_size,
        "planned disk size"
    );
    Ok(plan)
}
