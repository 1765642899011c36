//! Reading files out of a commit.
//!
//! The kernel shipped in the commit, not the build host's kernel, decides
//! whether features like fs-verity are available, so its build config is
//! read straight out of the resolved commit.

use std::path::Path;

use crate::error::{Error, Result};
use crate::process::Cmd;

pub const FS_VERITY_FLAG: &str = "CONFIG_FS_VERITY";

const MODULES_DIR: &str = "/usr/lib/modules";

/// A kernel build config (`/usr/lib/modules/<kver>/config`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    pub path: String,
    pub text: String,
}

impl KernelConfig {
    /// Whether `flag` is built in (`FLAG=y`).
    pub fn is_enabled(&self, flag: &str) -> bool {
        let wanted = format!("{flag}=y");
        self.text.lines().any(|line| line.trim() == wanted)
    }
}

/// Read-only view into commit contents.
pub trait CommitInspector {
    fn kernel_config(&self, repo: &Path, commit: &str) -> Result<KernelConfig>;
}

/// [`CommitInspector`] backed by the `ostree` command line tool.
#[derive(Debug, Clone)]
pub struct OstreeCli {
    program: String,
}

impl OstreeCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl CommitInspector for OstreeCli {
    fn kernel_config(&self, repo: &Path, commit: &str) -> Result<KernelConfig> {
        let repo_arg = format!("--repo={}", repo.display());
        let listing = Cmd::new(&self.program)
            .arg("ls")
            .arg(&repo_arg)
            .args([commit, MODULES_DIR])
            .error_msg("listing kernel module directories")
            .run()?;

        let kernels = parse_module_dirs(&listing.stdout);
        let kver = match kernels.as_slice() {
            [one] => one,
            [] => {
                return Err(Error::Tool {
                    tool: self.program.clone(),
                    reason: format!("no kernel found under {MODULES_DIR} in commit {commit}"),
                })
            }
            many => {
                return Err(Error::Tool {
                    tool: self.program.clone(),
                    reason: format!(
                        "expected exactly one kernel in commit {commit}, found: {}",
                        many.join(", ")
                    ),
                })
            }
        };

        let path = format!("{MODULES_DIR}/{kver}/config");
        let cat = Cmd::new(&self.program)
            .arg("cat")
            .arg(&repo_arg)
            .args([commit, path.as_str()])
            .error_msg("reading kernel config")
            .run()?;

        Ok(KernelConfig {
            path,
            text: cat.stdout,
        })
    }
}

/// Extract kernel version directory names from `ostree ls` output.
fn parse_module_dirs(listing: &str) -> Vec<String> {
    let prefix = format!("{MODULES_DIR}/");
    let mut out: Vec<String> = listing
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let mode = fields.next()?;
            let path = fields.last()?;
            if !mode.starts_with('d') {
                return None;
            }
            let name = path.strip_prefix(&prefix)?;
            (!name.is_empty() && !name.contains('/')).then(|| name.to_string())
        })
        .collect();
    out.sort();
    out
}

/// Fail with [`Error::UnsupportedKernelConfig`] unless `commit` ships a
/// kernel with `flag` enabled.
pub fn ensure_kernel_feature(
    inspector: &dyn CommitInspector,
    repo: &Path,
    commit: &str,
    flag: &str,
) -> Result<()> {
    let config = inspector.kernel_config(repo, commit)?;
    if !config.is_enabled(flag) {
        return Err(Error::UnsupportedKernelConfig {
            commit: commit.to_string(),
            flag: flag.to_string(),
            config_path: config.path,
        });
    }
    tracing::debug!(%commit, %flag, "kernel feature present");
    Ok(())
}
