//! Subprocess shell-out helper.
//!
//! Every provider driver talks to its ecosystem tool (`npm`, `pip`/`pip3`,
//! `go`, `cargo`) exclusively through this module, never through a bare
//! `std::process::Command` scattered around the driver. That keeps the
//! injection seam (§9 of the design) in one place: drivers take a
//! `&dyn ShellOut` rather than reaching for the real subprocess API
//! directly, so tests can swap in [`fake::FakeShell`].

pub mod fake;

use std::path::Path;

use async_trait::async_trait;
use zana_error::ZanaError;

/// Captured result of running a child process to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A single subprocess invocation, spelled out before it runs so that fakes
/// can match on it without caring how the real shell-out assembles
/// `std::process::Command`.
#[derive(Debug, Clone)]
pub struct CommandSpec<'a> {
    pub program: &'a str,
    pub args: Vec<&'a str>,
    pub cwd: Option<&'a Path>,
    pub envs: Vec<(&'a str, &'a str)>,
}

impl<'a> CommandSpec<'a> {
    pub fn new(program: &'a str) -> Self {
        Self {
            program,
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: &'a str) -> Self {
        self.args.push(arg);
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = &'a str>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn cwd(mut self, cwd: &'a Path) -> Self {
        self.cwd = Some(cwd);
        self
    }

    pub fn env(mut self, key: &'a str, value: &'a str) -> Self {
        self.envs.push((key, value));
        self
    }
}

/// Injection seam for everything that spawns a child process or probes
/// `PATH`. Providers depend only on this trait, never on `tokio::process`
/// directly.
#[async_trait]
pub trait ShellOut: Send + Sync {
    async fn run(&self, spec: CommandSpec<'_>) -> Result<CommandOutput, ZanaError>;

    /// True if `program` can be resolved on `PATH`.
    fn has_command(&self, program: &str) -> bool;
}

/// The real implementation, backed by `tokio::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShell;

#[async_trait]
impl ShellOut for SystemShell {
    async fn run(&self, spec: CommandSpec<'_>) -> Result<CommandOutput, ZanaError> {
        if !self.has_command(spec.program) {
            return Err(ZanaError::SubprocessMissing {
                command: spec.program.to_string(),
            });
        }

        let mut command = tokio::process::Command::new(spec.program);
        command.args(&spec.args);
        if let Some(cwd) = spec.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &spec.envs {
            command.env(key, value);
        }

        tracing::debug!(program = spec.program, args = ?spec.args, "shelling out");

        let output = command.output().await.map_err(|source| ZanaError::SubprocessFailed {
            command: spec.program.to_string(),
            exit_code: None,
            stderr: source.to_string(),
        })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn has_command(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn system_shell_runs_a_real_command() {
        let shell = SystemShell;
        let spec = if cfg!(windows) {
            CommandSpec::new("cmd").args(["/C", "echo hello"])
        } else {
            CommandSpec::new("echo").arg("hello")
        };
        let output = shell.run(spec).await.unwrap();
        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn missing_command_is_reported() {
        let shell = SystemShell;
        let err = shell
            .run(CommandSpec::new("zana-definitely-not-a-real-command"))
            .await
            .unwrap_err();
        assert!(matches!(err, ZanaError::SubprocessMissing { .. }));
    }
}
