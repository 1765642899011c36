//! Build directory access.
//!
//! This module provides:
//! - [`builds`] - Locate a build directory by id or `latest`
//! - [`meta`] - The per-build `meta.json` record and idempotency queries
//! - [`lock`] - Per-build advisory lock
//! - [`context`] - Working directory layout and [`BuildContext`]

pub mod builds;
pub mod context;
pub mod lock;
pub mod meta;

pub use builds::{locate_build, BuildSelector, LocatedBuild};
pub use context::{BuildContext, Workdir};
pub use lock::BuildLock;
pub use meta::{BuildMeta, ImageEntry};
