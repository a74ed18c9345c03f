//! External command execution.
//!
//! Every tool the pipeline drives (`btrfs`, `sfdisk`, `dd`, `systemd-*`,
//! `qemu-system-x86_64`) goes through [`Cmd`], so failures always name the
//! program, its exit code and whatever it wrote to stderr.

use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Builder for a single external command invocation.
///
/// Environment variables set with [`Cmd::env`] only reach the child; the
/// calling process's environment is never modified.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
    allow_fail: bool,
    error_prefix: Option<String>,
}

impl Cmd {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            current_dir: None,
            envs: Vec::new(),
            allow_fail: false,
            error_prefix: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(OsString::from(arg.as_ref()));
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(OsString::from(arg.as_ref()));
        }
        self
    }

    /// Add a path argument without lossy conversion.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.as_os_str().to_os_string());
        self
    }

    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Set an environment variable for the child only.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.envs
            .push((key.as_ref().to_string(), value.as_ref().to_string()));
        self
    }

    /// Don't turn a non-zero exit into an error.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.error_prefix = Some(msg.as_ref().to_string());
        self
    }

    /// Render the command line for logs.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        cmd
    }

    fn failure_prefix(&self) -> String {
        self.error_prefix
            .clone()
            .unwrap_or_else(|| format!("'{}' failed", self.program))
    }

    /// Run with stdin closed and output captured.
    pub fn run(self) -> Result<CommandResult> {
        tracing::debug!(command = %self.display(), "running");
        let output = self
            .command()
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to execute '{}'. Is it installed?", self.program))?;

        let result = CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::trace!(code = result.code(), stderr = result.stderr_trimmed(), "finished");

        if !self.allow_fail && !result.success() {
            let prefix = self.failure_prefix();
            let stderr = result.stderr_trimmed();
            if stderr.is_empty() {
                bail!("{} (exit code {})", prefix, result.code());
            } else {
                bail!("{} (exit code {}):\n{}", prefix, result.code(), stderr);
            }
        }

        Ok(result)
    }

    /// Run with inherited stdio, for tools whose output the operator should see.
    pub fn run_interactive(self) -> Result<ExitStatus> {
        tracing::debug!(command = %self.display(), "running (interactive)");
        let status = self
            .command()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("Failed to execute '{}'. Is it installed?", self.program))?;

        if !self.allow_fail && !status.success() {
            bail!(
                "{} (exit code {})",
                self.failure_prefix(),
                status.code().unwrap_or(-1)
            );
        }

        Ok(status)
    }

    /// Start the command in the background with inherited stdio.
    pub fn spawn(self) -> Result<Child> {
        tracing::debug!(command = %self.display(), "spawning");
        self.command()
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'. Is it installed?", self.program))
    }
}
