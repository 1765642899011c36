//! Commit resolution: find a store that holds the build's exact commit.
//!
//! The commit hash recorded in `meta.json` is authoritative. The primary
//! cache is used only when its ref already points at that hash; otherwise
//! the build's archived commit is unpacked into a scratch store.

use std::path::PathBuf;

use crate::build::BuildContext;
use crate::commit::archive::extract_commit_archive;
use crate::commit::repo::OstreeRepo;
use crate::error::{Error, Result};

/// Which store the commit was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreSource {
    Primary,
    Scratch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommit {
    pub repo: PathBuf,
    pub reference: String,
    pub commit: String,
    pub source: StoreSource,
    /// The ref was synthesized because the build records none.
    pub temporary_ref: bool,
}

/// Name used when the build has no stable ref.
pub fn temporary_ref_name(ctx: &BuildContext) -> String {
    format!("tmpref-{}", ctx.image_type)
}

pub fn resolve_commit(ctx: &BuildContext) -> Result<ResolvedCommit> {
    let commit = ctx.meta.ostree_commit.clone();
    let (reference, temporary_ref) = match &ctx.meta.reference {
        Some(r) => (r.clone(), false),
        None => (temporary_ref_name(ctx), true),
    };

    let primary = OstreeRepo::open(ctx.workdir.primary_repo());
    if primary.exists() && primary.rev_parse(&reference)?.as_deref() == Some(commit.as_str()) {
        tracing::info!(%reference, %commit, "using primary commit store");
        return Ok(ResolvedCommit {
            repo: primary.path().to_path_buf(),
            reference,
            commit,
            source: StoreSource::Primary,
            temporary_ref,
        });
    }

    let archive = ctx.commit_archive_path();
    if !archive.is_file() {
        return Err(Error::ArchiveMissing { commit, archive });
    }

    let scratch_path = ctx.scratch_repo();
    tracing::info!(
        %reference,
        %commit,
        archive = %archive.display(),
        "primary store lacks commit, importing into scratch store"
    );
    extract_commit_archive(&archive, &scratch_path)?;

    let scratch = OstreeRepo::open(&scratch_path);
    if !scratch.has_commit(&commit) {
        return Err(Error::metadata(
            &archive,
            format!("archive does not contain commit {commit}"),
        ));
    }
    // Downstream tooling addresses the commit by ref; make sure the ref in
    // the scratch store names exactly this commit.
    if scratch.rev_parse(&reference)?.as_deref() != Some(commit.as_str()) {
        scratch.set_ref(&reference, &commit)?;
    }

    Ok(ResolvedCommit {
        repo: scratch_path,
        reference,
        commit,
        source: StoreSource::Scratch,
        temporary_ref,
    })
}
