//! Builds bootable disk images from an existing OS build.
//!
//! A build directory already holds a `meta.json` and an archived OSTree
//! commit. This crate extends it with one disk image per invocation:
//!
//! - **metal** - raw image for bare metal
//! - **dasd** - raw image for s390x DASD devices (4096-byte blocks)
//! - **qemu** - qcow2 image sized from `image.yaml`
//!
//! # Architecture
//!
//! ```text
//! pipeline::run
//!     │
//!     ├── build     - locate build, lock, meta.json, BuildContext
//!     ├── image     - image type rules and image.yaml
//!     ├── commit    - primary/scratch commit stores, kernel inspection
//!     ├── disk      - size plan, kernel args, sandboxed assembly
//!     └── publish   - artifact rename, then meta.json rename
//! ```
//!
//! Privileged work (partitioning, formatting, deploying the commit) never
//! happens in this process; it is delegated to a [`disk::SandboxExecutor`].
//!
//! # Example
//!
//! ```rust,ignore
//! use diskimage_builder::{pipeline, Arch, BuildSelector, ImageType, Settings};
//!
//! let request = pipeline::BuildRequest {
//!     workdir: "/srv/fcos".into(),
//!     build: BuildSelector::Latest,
//!     arch: Arch::X86_64,
//!     image_type: ImageType::Metal,
//!     settings: Settings::load("/srv/fcos".as_ref())?,
//!     check_host_tools: true,
//! };
//! let outcome = pipeline::run(&request, services)?;
//! ```

pub mod arch;
pub mod build;
pub mod commit;
pub mod disk;
pub mod error;
pub mod image;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod publish;
pub mod settings;

pub use arch::Arch;
pub use build::{BuildContext, BuildMeta, BuildSelector, ImageEntry};
pub use error::{Error, Result, Stage, StageError};
pub use image::{ImageConfig, ImageType};
pub use pipeline::{BuildRequest, Outcome, Services};
pub use publish::Published;
pub use settings::Settings;
