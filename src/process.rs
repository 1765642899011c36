//! Thin wrapper around `std::process::Command` for external build tools.
//!
//! Every helper this crate shells out to (ostree, qemu-img, the size
//! estimator, the VM runner) goes through [`Cmd`] so spawn failures and
//! non-zero exits become [`Error::Tool`] with the tool name attached.

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use crate::error::{Error, Result};

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CommandResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Builder for a single external command invocation.
#[derive(Debug)]
pub struct Cmd {
    program: String,
    args: Vec<OsString>,
    error_msg: Option<String>,
    allow_fail: bool,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            error_msg: None,
            allow_fail: false,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    /// Message prefixed to the error when the command exits non-zero.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Return the result even when the command exits non-zero.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arg_list(&self) -> &[OsString] {
        &self.args
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    fn spawn_error(&self, err: std::io::Error) -> Error {
        Error::Tool {
            tool: self.program.clone(),
            reason: format!("failed to execute: {err}"),
        }
    }

    fn exit_error(&self, status: ExitStatus, detail: &str) -> Error {
        let prefix = self
            .error_msg
            .clone()
            .unwrap_or_else(|| "command failed".to_string());
        let code = status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let reason = if detail.is_empty() {
            format!("{prefix} (exit {code})")
        } else {
            format!("{prefix} (exit {code}): {detail}")
        };
        Error::Tool {
            tool: self.program.clone(),
            reason,
        }
    }

    /// Run with captured stdout/stderr.
    pub fn run(self) -> Result<CommandResult> {
        tracing::debug!(program = %self.program, args = ?self.args, "running command");
        let output = self
            .command()
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.spawn_error(e))?;

        let result = CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() && !self.allow_fail {
            return Err(self.exit_error(result.status, result.stderr.trim()));
        }
        Ok(result)
    }

    /// Run with stdout/stderr inherited from this process.
    ///
    /// Used for long-running helpers whose progress output should reach the
    /// operator directly.
    pub fn run_inherited(self) -> Result<ExitStatus> {
        tracing::debug!(program = %self.program, args = ?self.args, "running command (inherited stdio)");
        let status = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| self.spawn_error(e))?;

        if !status.success() && !self.allow_fail {
            return Err(self.exit_error(status, ""));
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout() {
        let result = Cmd::new("sh").args(["-c", "echo hello"]).run().unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[test]
    fn non_zero_exit_is_tool_error() {
        let err = Cmd::new("sh")
            .args(["-c", "echo broken >&2; exit 3"])
            .error_msg("check failed")
            .run()
            .unwrap_err();
        match err {
            Error::Tool { tool, reason } => {
                assert_eq!(tool, "sh");
                assert_eq!(reason, "check failed (exit 3): broken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn allow_fail_returns_status() {
        let result = Cmd::new("sh")
            .args(["-c", "exit 1"])
            .allow_fail()
            .run()
            .unwrap();
        assert!(!result.success());
    }

    #[test]
    fn missing_program_is_tool_error() {
        let err = Cmd::new("definitely_not_a_real_command_12345")
            .run()
            .unwrap_err();
        assert!(matches!(err, Error::Tool { .. }));
    }
}
