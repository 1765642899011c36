//! Kernel command line and platform id for the first boot.

use crate::arch::Arch;
use crate::build::BuildContext;
use crate::commit::inspect::{ensure_kernel_feature, CommitInspector, FS_VERITY_FLAG};
use crate::commit::ResolvedCommit;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootParams {
    pub platform_id: &'static str,
    pub kargs: Vec<String>,
}

impl BootParams {
    pub fn kernel_cmdline(&self) -> String {
        self.kargs.join(" ")
    }
}

/// Console arguments for `arch`. s390x auto-detects its console.
pub fn console_kargs(arch: Arch) -> &'static [&'static str] {
    match arch {
        Arch::X86_64 => &["console=tty0", "console=ttyS0,115200n8"],
        Arch::Aarch64 => &["console=ttyAMA0,115200n8"],
        Arch::Ppc64le => &["console=hvc0"],
        Arch::S390x => &[],
    }
}

pub fn build_boot_params(
    ctx: &BuildContext,
    resolved: &ResolvedCommit,
    inspector: &dyn CommitInspector,
) -> Result<BootParams> {
    ctx.image_type.ensure_supported_on(ctx.arch)?;

    if ctx.image_config.requires_fs_verity() {
        ensure_kernel_feature(inspector, &resolved.repo, &resolved.commit, FS_VERITY_FLAG)?;
    }

    let platform_id = ctx.image_type.platform_id();
    let mut kargs = ctx.image_config.extra_kargs.clone();
    kargs.extend(console_kargs(ctx.arch).iter().map(|k| k.to_string()));
    kargs.push(format!("ignition.platform.id={platform_id}"));

    Ok(BootParams { platform_id, kargs })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s390x_has_no_console() {
        assert!(console_kargs(Arch::S390x).is_empty());
        assert_eq!(console_kargs(Arch::X86_64).len(), 2);
    }

    #[test]
    fn cmdline_joins_in_order() {
        let params = BootParams {
            platform_id: "metal",
            kargs: vec!["quiet".into(), "ignition.platform.id=metal".into()],
        };
        assert_eq!(params.kernel_cmdline(), "quiet ignition.platform.id=metal");
    }
}
