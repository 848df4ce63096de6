//! Test-suite adapter for the fix loop.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{info, instrument, warn};

use crate::core::types::TestOutcome;
use crate::io::config::TestsConfig;
use crate::io::process::{ProcessLimits, run_with_limits};

/// Runs the project's test suite once.
///
/// An `Err` means the suite could not be run at all (spawn failure, timeout);
/// failing tests are an `Ok` outcome with `passed == false`.
pub trait TestRunner {
    fn run(&self) -> Result<TestOutcome>;
}

/// Runs a configured argv such as `python3 -m pytest ../test_suite/`.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    command: Vec<String>,
    workdir: Option<PathBuf>,
    limits: ProcessLimits,
}

impl CommandTestRunner {
    pub fn new(command: Vec<String>, limits: ProcessLimits) -> Result<Self> {
        if command.is_empty() {
            bail!("test command must be non-empty");
        }
        Ok(Self {
            command,
            workdir: None,
            limits,
        })
    }

    pub fn from_config(cfg: &TestsConfig) -> Result<Self> {
        let runner = Self::new(cfg.command.clone(), cfg.limits())?;
        Ok(match &cfg.workdir {
            Some(dir) => runner.in_dir(dir),
            None => runner,
        })
    }

    /// Run from `workdir` instead of the current directory.
    pub fn in_dir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }
}

impl TestRunner for CommandTestRunner {
    #[instrument(skip_all, fields(command = ?self.command))]
    fn run(&self) -> Result<TestOutcome> {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let output = run_with_limits(cmd, self.limits).context("run test suite")?;
        if output.timed_out {
            warn!(timeout_secs = self.limits.timeout.as_secs(), "test run timed out");
            return Err(anyhow!(
                "test run timed out after {}s",
                self.limits.timeout.as_secs()
            ));
        }

        let exit_code = output.status.code();
        info!(exit_code = ?exit_code, "test run completed");
        Ok(TestOutcome {
            passed: output.status.success(),
            exit_code,
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn runner(script: &str, timeout_secs: u64) -> CommandTestRunner {
        CommandTestRunner::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            ProcessLimits {
                timeout: Duration::from_secs(timeout_secs),
                output_limit_bytes: 4096,
            },
        )
        .expect("runner")
    }

    #[test]
    fn passing_suite_reports_success() {
        let outcome = runner("echo 1 passed", 5).run().expect("run");
        assert!(outcome.passed);
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.stdout.contains("1 passed"));
    }

    #[test]
    fn failing_suite_is_ok_outcome() {
        let outcome = runner("echo './a.py:1: AssertionError'; exit 1", 5)
            .run()
            .expect("run");
        assert!(!outcome.passed);
        assert_eq!(outcome.diagnostic_text().trim(), "./a.py:1: AssertionError");
    }

    #[test]
    fn timeout_is_an_error() {
        let err = runner("exec sleep 5", 1).run().unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn runs_in_configured_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("marker.txt"), "here").expect("write");
        let outcome = runner("cat marker.txt", 5)
            .in_dir(temp.path())
            .run()
            .expect("run");
        assert_eq!(outcome.stdout, "here");
    }

    #[test]
    fn configured_workdir_is_used() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("marker.txt"), "from config").expect("write");
        let cfg = TestsConfig {
            command: vec!["sh".to_string(), "-c".to_string(), "cat marker.txt".to_string()],
            workdir: Some(temp.path().to_path_buf()),
            ..TestsConfig::default()
        };
        let outcome = CommandTestRunner::from_config(&cfg)
            .expect("runner")
            .run()
            .expect("run");
        assert!(outcome.passed);
        assert_eq!(outcome.stdout, "from config");
    }

    #[test]
    fn rejects_empty_command() {
        let limits = TestsConfig::default().limits();
        assert!(CommandTestRunner::new(Vec::new(), limits).is_err());
    }
}
