//! Image types and per-image configuration.
//!
//! - [`kind`] - Image type enumeration, disk formats, platform ids
//! - [`config`] - Typed `image.yaml` loader

pub mod config;
pub mod kind;

pub use config::{BootfsType, ImageConfig, RootfsType};
pub use kind::{DiskFormat, ImageType, SizingMode};
