//! A deterministic, in-memory [`ShellOut`] for driver unit tests, used
//! instead of shelling out to real ecosystem tools.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use zana_error::ZanaError;

use crate::{CommandOutput, CommandSpec, ShellOut};

/// A canned response, matched by `program` + the full argument vector.
#[derive(Debug, Clone)]
pub struct Canned {
    pub output: Result<CommandOutput, FakeError>,
}

#[derive(Debug, Clone)]
pub enum FakeError {
    Missing,
    Failed { exit_code: i32, stderr: String },
}

/// Fake shell that serves programmed responses keyed by `(program, args)`
/// and records every invocation it was asked to make, so tests can assert
/// on exactly which subprocess calls a driver issued (e.g. "no `npm
/// install` invocation on the second `Sync`", per the idempotence property).
#[derive(Default)]
pub struct FakeShell {
    responses: Mutex<HashMap<(String, Vec<String>), Canned>>,
    available: Mutex<HashMap<String, bool>>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, program: &str, available: bool) {
        self.available
            .lock()
            .unwrap()
            .insert(program.to_string(), available);
    }

    pub fn on(&self, program: &str, args: &[&str], output: CommandOutput) -> &Self {
        self.responses.lock().unwrap().insert(
            (program.to_string(), args.iter().map(|s| s.to_string()).collect()),
            Canned { output: Ok(output) },
        );
        self
    }

    pub fn on_success(&self, program: &str, args: &[&str], stdout: &str) -> &Self {
        self.on(
            program,
            args,
            CommandOutput {
                exit_code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        )
    }

    pub fn on_failure(&self, program: &str, args: &[&str], exit_code: i32, stderr: &str) -> &Self {
        self.responses.lock().unwrap().insert(
            (program.to_string(), args.iter().map(|s| s.to_string()).collect()),
            Canned {
                output: Err(FakeError::Failed {
                    exit_code,
                    stderr: stderr.to_string(),
                }),
            },
        );
        self
    }

    /// All `(program, args)` pairs this fake was asked to run, in order.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, program: &str) -> usize {
        self.calls()
            .into_iter()
            .filter(|(p, _)| p == program)
            .count()
    }
}

#[async_trait]
impl ShellOut for FakeShell {
    async fn run(&self, spec: CommandSpec<'_>) -> Result<CommandOutput, ZanaError> {
        let args: Vec<String> = spec.args.iter().map(|s| s.to_string()).collect();
        self.calls
            .lock()
            .unwrap()
            .push((spec.program.to_string(), args.clone()));

        if !self.has_command(spec.program) {
            return Err(ZanaError::SubprocessMissing {
                command: spec.program.to_string(),
            });
        }

        let key = (spec.program.to_string(), args);
        match self.responses.lock().unwrap().get(&key) {
            Some(Canned { output: Ok(output) }) => Ok(output.clone()),
            Some(Canned {
                output: Err(FakeError::Missing),
            }) => Err(ZanaError::SubprocessMissing {
                command: spec.program.to_string(),
            }),
            Some(Canned {
                output: Err(FakeError::Failed { exit_code, stderr }),
            }) => Err(ZanaError::SubprocessFailed {
                command: spec.program.to_string(),
                exit_code: Some(*exit_code),
                stderr: stderr.clone(),
            }),
            None => Err(ZanaError::SubprocessFailed {
                command: spec.program.to_string(),
                exit_code: None,
                stderr: format!(
                    "FakeShell has no programmed response for `{} {:?}`",
                    spec.program, key.1
                ),
            }),
        }
    }

    fn has_command(&self, program: &str) -> bool {
        *self.available.lock().unwrap().get(program).unwrap_or(&true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_replays_calls() {
        let shell = FakeShell::new();
        shell.on_success("npm", &["view", "eslint", "version"], "9.1.0\n");

        let out = shell
            .run(CommandSpec::new("npm").args(["view", "eslint", "version"]))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "9.1.0");
        assert_eq!(shell.call_count("npm"), 1);
    }

    #[tokio::test]
    async fn missing_tool_is_reported() {
        let shell = FakeShell::new();
        shell.set_available("go", false);
        let err = shell.run(CommandSpec::new("go").arg("install")).await.unwrap_err();
        assert!(matches!(err, ZanaError::SubprocessMissing { .. }));
    }
}
