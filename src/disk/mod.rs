//! Disk image planning and assembly.
//!
//! - [`size`] - Target image and root partition sizes
//! - [`kargs`] - Kernel command line and platform id
//! - [`device`] - How the image is attached inside the sandbox
//! - [`sandbox`] - The privileged disk writer boundary
//! - [`assemble`] - Image allocation and sandbox invocation

pub mod assemble;
pub mod device;
pub mod kargs;
pub mod sandbox;
pub mod size;

pub use assemble::{assemble_disk, TempArtifact};
pub use kargs::{build_boot_params, BootParams};
pub use sandbox::{AssemblyParams, SandboxExecutor, VmSandbox};
pub use size::{plan_disk_size, CommandEstimator, DiskSize, EstimateRequest, SizeEstimator, SizePlan};
