//! Process invocation seam.
//!
//! Every external command in the pipeline (version probes, host queries,
//! provisioning, the job itself) goes through a `ProcessRunner`, so tests can
//! substitute a `MockRunner` and exercise the pipeline without spawning
//! anything.

use std::process::Command;

use crate::{RecapError, RecapResult};

/// Captured output of one child process.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `None` when the child was killed by a signal.
    pub code: Option<i32>,
}

impl RunOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        RunOutput {
            stdout: stdout.into(),
            stderr: String::new(),
            code: Some(0),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        RunOutput {
            stdout: String::new(),
            stderr: stderr.into(),
            code: Some(code),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Blocking, retry-free process invocation.
///
/// Spawns one OS process per call and waits for it to terminate. Callers
/// decide whether a non-zero exit is fatal.
pub trait ProcessRunner {
    fn run(&self, argv: &[String]) -> RecapResult<RunOutput>;
}

/// `ProcessRunner` backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProcessRunner;

impl ProcessRunner for OsProcessRunner {
    fn run(&self, argv: &[String]) -> RecapResult<RunOutput> {
        let (program, args) = argv.split_first().ok_or(RecapError::EmptyCommand)?;

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| RecapError::ProcessSpawn {
                command: program.clone(),
                source,
            })?;

        Ok(RunOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code(),
        })
    }
}

/// Mock runner for tests.
///
/// Responses are matched against the full argv first, then by program name;
/// unmatched invocations fall back to the default response or fail the same
/// way a missing executable would. Every invocation is logged so tests can
/// assert which commands ran, and in what order.
#[derive(Debug, Default)]
pub struct MockRunner {
    exact: Vec<(Vec<String>, RunOutput)>,
    by_program: Vec<(String, RunOutput)>,
    default: Option<RunOutput>,
    calls: std::cell::RefCell<Vec<Vec<String>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stub a response for an exact argv.
    pub fn on<S: Into<String>>(mut self, argv: impl IntoIterator<Item = S>, output: RunOutput) -> Self {
        self.exact
            .push((argv.into_iter().map(Into::into).collect(), output));
        self
    }

    /// Stub a response for any invocation of `program`.
    pub fn on_program(mut self, program: impl Into<String>, output: RunOutput) -> Self {
        self.by_program.push((program.into(), output));
        self
    }

    /// Response for anything not otherwise stubbed.
    pub fn with_default(mut self, output: RunOutput) -> Self {
        self.default = Some(output);
        self
    }

    /// All argvs this runner has been asked to run, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }
}

impl ProcessRunner for MockRunner {
    fn run(&self, argv: &[String]) -> RecapResult<RunOutput> {
        let program = argv.first().ok_or(RecapError::EmptyCommand)?;
        self.calls.borrow_mut().push(argv.to_vec());

        if let Some((_, out)) = self.exact.iter().find(|(a, _)| a == argv) {
            return Ok(out.clone());
        }
        if let Some((_, out)) = self.by_program.iter().find(|(p, _)| p == program) {
            return Ok(out.clone());
        }
        if let Some(out) = &self.default {
            return Ok(out.clone());
        }

        Err(RecapError::ProcessSpawn {
            command: program.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such stub"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn os_runner_captures_stdout_and_exit_code() {
        let out = OsProcessRunner.run(&argv(&["sh", "-c", "printf hi"])).unwrap();
        assert_eq!(out.stdout, "hi");
        assert!(out.success());
    }

    #[test]
    fn os_runner_captures_stderr_separately() {
        let out = OsProcessRunner
            .run(&argv(&["sh", "-c", "printf oops >&2; exit 3"]))
            .unwrap();
        assert_eq!(out.stdout, "");
        assert_eq!(out.stderr, "oops");
        assert_eq!(out.code, Some(3));
        assert!(!out.success());
    }

    #[test]
    fn os_runner_missing_executable_is_spawn_error() {
        let err = OsProcessRunner
            .run(&argv(&["recap-test-no-such-binary"]))
            .unwrap_err();
        assert!(matches!(err, RecapError::ProcessSpawn { .. }));
    }

    #[test]
    fn empty_argv_is_rejected() {
        let err = OsProcessRunner.run(&[]).unwrap_err();
        assert!(matches!(err, RecapError::EmptyCommand));
    }

    #[test]
    fn mock_matches_exact_before_program() {
        let runner = MockRunner::new()
            .on(["tool", "--version"], RunOutput::ok("tool 1.0\n"))
            .on_program("tool", RunOutput::ok("generic\n"));

        let out = runner.run(&argv(&["tool", "--version"])).unwrap();
        assert_eq!(out.stdout, "tool 1.0\n");
        let out = runner.run(&argv(&["tool", "run"])).unwrap();
        assert_eq!(out.stdout, "generic\n");
    }

    #[test]
    fn mock_logs_invocations_in_order() {
        let runner = MockRunner::new().with_default(RunOutput::ok(""));
        runner.run(&argv(&["first"])).unwrap();
        runner.run(&argv(&["second", "arg"])).unwrap();
        assert_eq!(runner.calls(), vec![argv(&["first"]), argv(&["second", "arg"])]);
    }

    #[test]
    fn mock_unstubbed_behaves_like_missing_executable() {
        let runner = MockRunner::new();
        let err = runner.run(&argv(&["ghost"])).unwrap_err();
        assert!(matches!(err, RecapError::ProcessSpawn { .. }));
    }
}
