//! Shared deterministic types for the fix loop.
//!
//! These types define stable contracts between the loop and its collaborators.
//! They carry no I/O handles.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Result of one test-suite invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl TestOutcome {
    /// Diagnostic text for the oracle: stderr, or stdout when stderr is empty.
    pub fn diagnostic_text(&self) -> &str {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Whole-file replacement proposed by the oracle for one diagnosed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixCandidate {
    pub path: PathBuf,
    pub contents: String,
}

/// Why a fix run gave up and restored the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The test runner could not be started, or it timed out.
    TestRun,
    /// No file reference could be resolved from the diagnostic text.
    Diagnosis,
    /// The diagnosed file could not be read.
    ReadFile,
    /// The fix prompt could not be rendered.
    Prompt,
    /// The oracle returned an error.
    Oracle,
    /// The oracle reply was empty once fences were stripped.
    EmptyReply,
    /// The fix could not be written.
    WriteFile,
    /// Every attempt was used and the tests still fail.
    AttemptsExhausted,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::TestRun => "test_run",
            FailureKind::Diagnosis => "diagnosis",
            FailureKind::ReadFile => "read_file",
            FailureKind::Prompt => "prompt",
            FailureKind::Oracle => "oracle",
            FailureKind::EmptyReply => "empty_reply",
            FailureKind::WriteFile => "write_file",
            FailureKind::AttemptsExhausted => "attempts_exhausted",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a fix run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixStop {
    /// The test suite passed; the live tree keeps every applied fix.
    TestsPassed,
    /// The live tree was restored from the backup.
    Restored { reason: FailureKind },
}

/// Summary of a fix run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixOutcome {
    pub run_id: String,
    /// Number of attempts started (test-runner invocations requested).
    pub attempts: u32,
    /// Files overwritten with oracle output, in application order.
    pub fixed_files: Vec<PathBuf>,
    pub stop: FixStop,
}

impl FixOutcome {
    pub fn succeeded(&self) -> bool {
        self.stop == FixStop::TestsPassed
    }
}
