//! The privilege boundary: partitioning, formatting and populating the disk
//! happen inside an isolated VM, never in this process.

use std::path::PathBuf;

use crate::disk::device::TargetDrive;
use crate::disk::size::DiskSize;
use crate::error::{Error, Result};
use crate::image::RootfsType;
use crate::process::Cmd;

/// Everything the disk writer needs, derived by earlier stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyParams {
    pub drive: TargetDrive,
    /// Target block device path inside the sandbox.
    pub device: String,
    pub build_id: String,
    pub image_name: String,
    pub grub_script: PathBuf,
    pub kargs: String,
    pub os_name: String,
    pub reference: String,
    pub commit: String,
    pub repo: PathBuf,
    pub remote: Option<String>,
    pub save_var_subdirs: Option<Vec<String>>,
    pub rootfs_size: DiskSize,
    pub rootfs: RootfsType,
    pub boot_verity: bool,
}

impl AssemblyParams {
    /// Arguments for the disk writer script.
    pub fn script_args(&self) -> Vec<String> {
        let mut args = vec![
            "--disk".to_string(),
            self.device.clone(),
            "--buildid".to_string(),
            self.build_id.clone(),
            "--imgid".to_string(),
            self.image_name.clone(),
            "--grub-script".to_string(),
            self.grub_script.display().to_string(),
            "--kargs".to_string(),
            self.kargs.clone(),
            "--osname".to_string(),
            self.os_name.clone(),
            "--ostree-ref".to_string(),
            self.reference.clone(),
            "--ostree-commit".to_string(),
            self.commit.clone(),
            "--ostree-repo".to_string(),
            self.repo.display().to_string(),
        ];
        if let Some(remote) = &self.remote {
            args.extend(["--ostree-remote".to_string(), remote.clone()]);
        }
        if let Some(dirs) = &self.save_var_subdirs {
            args.extend(["--save-var-subdirs".to_string(), dirs.join(",")]);
        }
        args.extend([
            "--rootfs-size".to_string(),
            self.rootfs_size.to_string(),
            "--rootfs".to_string(),
            self.rootfs.as_str().to_string(),
        ]);
        if self.boot_verity {
            args.push("--boot-verity".to_string());
        }
        args
    }
}

/// Runs the disk writer in an isolated, privileged context.
///
/// Success means the target device is bootable. Any failure is final.
pub trait SandboxExecutor {
    fn run(&self, params: &AssemblyParams) -> Result<()>;
}

/// [`SandboxExecutor`] that boots a throwaway VM via a runner helper:
/// `<runner> <drive args> -- <script> <script args>`.
#[derive(Debug, Clone)]
pub struct VmSandbox {
    runner: String,
    script: PathBuf,
}

impl VmSandbox {
    pub fn new(runner: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            runner: runner.into(),
            script: script.into(),
        }
    }

    pub fn command(&self, params: &AssemblyParams) -> Cmd {
        Cmd::new(&self.runner)
            .args(params.drive.qemu_args())
            .arg("--")
            .arg_path(&self.script)
            .args(params.script_args())
    }
}

impl SandboxExecutor for VmSandbox {
    fn run(&self, params: &AssemblyParams) -> Result<()> {
        tracing::info!(image = %params.image_name, runner = %self.runner, "starting sandboxed disk assembly");
        let status = self.command(params).allow_fail().run_inherited()?;
        if !status.success() {
            return Err(Error::DiskAssemblyFailed {
                reason: format!("{} exited with {}", self.runner, status),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{DiskFormat, ImageType};
    use std::path::Path;

    fn params() -> AssemblyParams {
        AssemblyParams {
            drive: TargetDrive::for_image(ImageType::Metal, Path::new("/w/tmp/img.raw")),
            device: "/dev/vda".into(),
            build_id: "testbuild".into(),
            image_name: "fcos-testbuild-metal.x86_64.raw".into(),
            grub_script: "/usr/lib/grub.cfg".into(),
            kargs: "console=tty0 ignition.platform.id=metal".into(),
            os_name: "fcos".into(),
            reference: "tmpref-metal".into(),
            commit: "c0ffee".into(),
            repo: "/w/tmp/repo".into(),
            remote: None,
            save_var_subdirs: None,
            rootfs_size: DiskSize::INHERIT,
            rootfs: RootfsType::Xfs,
            boot_verity: false,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn script_args_cover_parameters() {
        let args = params().script_args();
        assert_eq!(value_after(&args, "--disk"), Some("/dev/vda"));
        assert_eq!(value_after(&args, "--rootfs-size"), Some("0"));
        assert_eq!(value_after(&args, "--rootfs"), Some("xfs"));
        assert_eq!(
            value_after(&args, "--kargs"),
            Some("console=tty0 ignition.platform.id=metal")
        );
        assert!(!args.iter().any(|a| a == "--ostree-remote"));
        assert!(!args.iter().any(|a| a == "--boot-verity"));
    }

    #[test]
    fn optional_arguments() {
        let mut p = params();
        p.remote = Some("fedora".into());
        p.save_var_subdirs = Some(vec!["lib/systemd".into(), "lib/nfs".into()]);
        p.boot_verity = true;
        let args = p.script_args();
        assert_eq!(value_after(&args, "--ostree-remote"), Some("fedora"));
        assert_eq!(value_after(&args, "--save-var-subdirs"), Some("lib/systemd,lib/nfs"));
        assert_eq!(args.last().map(String::as_str), Some("--boot-verity"));
    }

    #[test]
    fn vm_command_layout() {
        let sandbox = VmSandbox::new("runvm", "/usr/lib/create_disk.sh");
        let cmd = sandbox.command(&params());
        assert_eq!(cmd.program(), "runvm");
        let args: Vec<String> = cmd
            .arg_list()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], "-drive");
        assert_eq!(args[1], format!("if=virtio,id=target,format={},file=/w/tmp/img.raw,cache=unsafe", DiskFormat::Raw));
        assert_eq!(args[2], "--");
        assert_eq!(args[3], "/usr/lib/create_disk.sh");
        assert_eq!(args[4], "--disk");
    }

    #[test]
    fn failing_runner_is_disk_assembly_failed() {
        let sandbox = VmSandbox::new("false", "/nonexistent");
        let err = sandbox.run(&params()).unwrap_err();
        assert!(matches!(err, Error::DiskAssemblyFailed { .. }));
    }
}
