//! Commit store access.
//!
//! - [`repo`] - Ref lookup and creation on an on-disk OSTree repository
//! - [`archive`] - Unpacking archived commit tarballs
//! - [`resolver`] - Choosing the primary or a scratch store for a build
//! - [`inspect`] - Reading files (kernel config) out of a commit

pub mod archive;
pub mod inspect;
pub mod repo;
pub mod resolver;

pub use inspect::{CommitInspector, KernelConfig, OstreeCli};
pub use repo::OstreeRepo;
pub use resolver::{resolve_commit, ResolvedCommit, StoreSource};
