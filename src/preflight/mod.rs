//! Preflight checks for disk image builds.
//!
//! Validates that the host has the external helpers the pipeline shells out
//! to before any commit is resolved or image allocated. This prevents
//! cryptic errors halfway through a build.
//!
//! # Example
//!
//! ```rust
//! use diskimage_builder::preflight::{command_exists, check_required_tools};
//!
//! if !command_exists("ostree") {
//!     println!("ostree not installed");
//! }
//!
//! let tools = &[("sh", "coreutils")];
//! assert!(check_required_tools(tools).is_ok());
//! ```

use crate::error::{Error, Result};
use crate::settings::Settings;

/// Check if a command exists on the host system.
///
/// Accepts bare names (searched in `PATH`) and explicit paths.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Check that specific tools are available.
///
/// Each tuple is (command, package). Returns [`Error::Tool`] listing every
/// missing command and the package that provides it.
pub fn check_required_tools<S: AsRef<str>>(tools: &[(S, &str)]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool.as_ref()))
        .map(|(tool, package)| format!("  {} (install: {})", tool.as_ref(), package))
        .collect();

    if !missing.is_empty() {
        return Err(Error::Tool {
            tool: "preflight".to_string(),
            reason: format!("missing required host tools:\n{}", missing.join("\n")),
        });
    }

    Ok(())
}

/// The host tools a disk image build needs, as configured in `settings`.
pub fn required_tools(settings: &Settings) -> Vec<(String, &'static str)> {
    vec![
        (settings.tools.ostree.clone(), "ostree"),
        (settings.tools.qemu_img.clone(), "qemu-img"),
        (settings.tools.estimator.clone(), "disk size estimator"),
        (settings.tools.runvm.clone(), "VM runner"),
    ]
}

/// Check every tool the pipeline will invoke.
pub fn check_host_tools(settings: &Settings) -> Result<()> {
    check_required_tools(&required_tools(settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        assert!(command_exists("sh"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_check_required_tools_success() {
        let tools = &[("sh", "coreutils"), ("cat", "coreutils")];
        assert!(check_required_tools(tools).is_ok());
    }

    #[test]
    fn test_check_required_tools_failure() {
        let tools = &[("nonexistent_command_xyz", "fake-package")];
        let err = check_required_tools(tools).unwrap_err();
        assert!(err.to_string().contains("nonexistent_command_xyz (install: fake-package)"));
    }

    #[test]
    fn required_tools_follow_settings() {
        let mut settings = Settings::default();
        settings.tools.runvm = "/opt/bin/runvm".to_string();
        let tools = required_tools(&settings);
        assert!(tools.iter().any(|(t, _)| t == "/opt/bin/runvm"));
        assert_eq!(tools.len(), 4);
    }
}
