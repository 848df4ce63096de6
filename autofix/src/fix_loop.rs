//! Fix-apply-retry loop for `autofix fix`.
//!
//! One run backs up the target tree, then for each attempt: runs the tests,
//! diagnoses the failing file from the test output, asks the oracle for a
//! replacement, and overwrites the file. The run ends when the tests pass or
//! on the first failure of any step, in which case the tree is restored from
//! the backup. Running out of attempts also restores.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, info_span, warn};

use crate::core::diagnose::extract_file_reference;
use crate::core::fences::strip_fence_markers;
use crate::core::types::{FailureKind, FixCandidate, FixOutcome, FixStop};
use crate::io::attempt_log::{AttemptMeta, AttemptRecord, write_attempt};
use crate::io::config::AutofixConfig;
use crate::io::locate::resolve_reference;
use crate::io::oracle::{Oracle, OracleRequest};
use crate::io::prompt::{FixPromptInputs, render_fix_prompt};
use crate::io::snapshot::Snapshot;
use crate::io::test_runner::TestRunner;

/// Paths and bounds for one fix run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixSettings {
    pub target_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub max_attempts: u32,
    pub attempts_dir: Option<PathBuf>,
}

impl FixSettings {
    pub fn from_config(cfg: &AutofixConfig) -> Self {
        Self {
            target_dir: cfg.target_dir.clone(),
            backup_dir: cfg.backup_dir.clone(),
            max_attempts: cfg.max_attempts,
            attempts_dir: cfg.attempts_dir.clone(),
        }
    }
}

/// Everything one fix run needs: the oracle, the test runner and the settings.
///
/// Sessions share no state, so independent (target, backup) pairs can be
/// fixed from separate threads with separate sessions.
pub struct FixSession<'a, O: Oracle + ?Sized, T: TestRunner + ?Sized> {
    oracle: &'a O,
    tests: &'a T,
    settings: FixSettings,
    run_id: String,
}

/// Result of a single attempt.
#[derive(Debug)]
enum AttemptResult {
    Passed,
    Applied(PathBuf),
    Failed(FailureKind),
}

/// What an attempt observed, for the attempt record.
#[derive(Debug, Default)]
struct AttemptTrace {
    tests_passed: Option<bool>,
    exit_code: Option<i32>,
    diagnostic: Option<String>,
    file: Option<PathBuf>,
    reply: Option<String>,
}

impl<'a, O: Oracle + ?Sized, T: TestRunner + ?Sized> FixSession<'a, O, T> {
    pub fn new(oracle: &'a O, tests: &'a T, settings: FixSettings) -> Self {
        Self {
            oracle,
            tests,
            settings,
            run_id: Utc::now().format("%Y%m%d_%H%M%S").to_string(),
        }
    }

    /// Use a fixed run id (attempt records are grouped under it).
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Drive the target tree to a passing test suite, or restore it.
    ///
    /// Returns `Err` only when the initial backup cannot be taken (nothing was
    /// touched) or when a restore itself fails. Every other failure is reported
    /// as [`FixStop::Restored`].
    pub fn run(&self) -> Result<FixOutcome> {
        let span = info_span!("fix", run_id = %self.run_id);
        let _guard = span.enter();

        let snapshot = Snapshot::take(&self.settings.target_dir, &self.settings.backup_dir)
            .context("create initial backup")?;

        let max_attempts = self.settings.max_attempts;
        let mut fixed_files = Vec::new();
        let mut attempts = 0u32;

        for attempt in 1..=max_attempts {
            attempts = attempt;
            info!(attempt, max_attempts, "starting attempt");
            let started = Instant::now();
            let mut trace = AttemptTrace::default();

            let result = self.attempt(attempt, &mut trace);

            let stop = match result {
                AttemptResult::Passed => {
                    info!(attempt, "all tests passed, project is fixed");
                    Some(FixStop::TestsPassed)
                }
                AttemptResult::Failed(reason) => {
                    error!(attempt, reason = %reason, "attempt failed, restoring project");
                    Some(FixStop::Restored { reason })
                }
                AttemptResult::Applied(path) => {
                    fixed_files.push(path);
                    if attempt == max_attempts {
                        error!(
                            attempt,
                            "max attempts reached with tests still failing, restoring project"
                        );
                        Some(FixStop::Restored {
                            reason: FailureKind::AttemptsExhausted,
                        })
                    } else {
                        None
                    }
                }
            };

            let failure = match stop {
                Some(FixStop::Restored { reason }) => Some(reason),
                _ => None,
            };
            self.record_attempt(attempt, &trace, failure, started);

            if let Some(stop) = stop {
                if let FixStop::Restored { reason } = stop {
                    snapshot
                        .restore()
                        .with_context(|| format!("restore project after {reason} failure"))?;
                }
                info!(attempts, "fix run finished");
                return Ok(FixOutcome {
                    run_id: self.run_id.clone(),
                    attempts,
                    fixed_files,
                    stop,
                });
            }
        }

        // Only reachable when the loop body never ran; max_attempts is validated > 0.
        snapshot
            .restore()
            .context("restore project after exhausting attempts")?;
        Ok(FixOutcome {
            run_id: self.run_id.clone(),
            attempts,
            fixed_files,
            stop: FixStop::Restored {
                reason: FailureKind::AttemptsExhausted,
            },
        })
    }

    fn attempt(&self, attempt: u32, trace: &mut AttemptTrace) -> AttemptResult {
        let outcome = match self.tests.run() {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(attempt, err = %format!("{err:#}"), "failed to run tests");
                return AttemptResult::Failed(FailureKind::TestRun);
            }
        };
        trace.tests_passed = Some(outcome.passed);
        trace.exit_code = outcome.exit_code;
        if outcome.passed {
            return AttemptResult::Passed;
        }

        warn!(attempt, exit_code = ?outcome.exit_code, "tests failed, generating fix");
        let diagnostic = outcome.diagnostic_text().to_string();
        trace.diagnostic = Some(diagnostic.clone());

        let Some(reference) = extract_file_reference(&diagnostic) else {
            error!(attempt, diagnostic = %diagnostic, "could not parse file path from test output");
            return AttemptResult::Failed(FailureKind::Diagnosis);
        };
        let Some(path) = resolve_reference(&self.settings.target_dir, &reference) else {
            error!(
                attempt,
                reference = %reference.raw,
                target = %self.settings.target_dir.display(),
                "diagnosed file not found under target"
            );
            return AttemptResult::Failed(FailureKind::Diagnosis);
        };
        trace.file = Some(path.clone());

        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(err) => {
                error!(attempt, path = %path.display(), err = %err, "failed to read diagnosed file");
                return AttemptResult::Failed(FailureKind::ReadFile);
            }
        };

        let display_path = path.display().to_string();
        let prompt = match render_fix_prompt(&FixPromptInputs {
            diagnostic: &diagnostic,
            path: &display_path,
            source: &source,
        }) {
            Ok(prompt) => prompt,
            Err(err) => {
                error!(attempt, err = %format!("{err:#}"), "failed to render fix prompt");
                return AttemptResult::Failed(FailureKind::Prompt);
            }
        };

        let reply = match self.oracle.generate(&OracleRequest::new(prompt)) {
            Ok(reply) => reply,
            Err(err) => {
                error!(attempt, path = %display_path, err = %err, "failed to generate fix");
                return AttemptResult::Failed(FailureKind::Oracle);
            }
        };
        trace.reply = Some(reply.clone());

        let candidate = FixCandidate {
            contents: strip_fence_markers(&reply),
            path,
        };
        if candidate.contents.is_empty() {
            error!(attempt, path = %display_path, "oracle reply was empty");
            return AttemptResult::Failed(FailureKind::EmptyReply);
        }

        if let Err(err) = fs::write(&candidate.path, &candidate.contents) {
            error!(attempt, path = %display_path, err = %err, "failed to write fix");
            return AttemptResult::Failed(FailureKind::WriteFile);
        }
        info!(attempt, path = %display_path, bytes = candidate.contents.len(), "applied fix");
        AttemptResult::Applied(candidate.path)
    }

    fn record_attempt(
        &self,
        attempt: u32,
        trace: &AttemptTrace,
        failure: Option<FailureKind>,
        started: Instant,
    ) {
        let Some(dir) = &self.settings.attempts_dir else {
            return;
        };
        let meta = AttemptMeta {
            run_id: self.run_id.clone(),
            attempt,
            tests_passed: trace.tests_passed,
            exit_code: trace.exit_code,
            file: trace.file.as_ref().map(|path| {
                path.strip_prefix(&self.settings.target_dir)
                    .unwrap_or(path)
                    .display()
                    .to_string()
            }),
            failure,
            duration_ms: Some(started.elapsed().as_millis() as u64),
        };
        let record = AttemptRecord {
            meta: &meta,
            diagnostic: trace.diagnostic.as_deref(),
            reply: trace.reply.as_deref(),
        };
        if let Err(err) = write_attempt(dir, &record) {
            warn!(attempt, err = %format!("{err:#}"), "failed to write attempt record");
        }
    }
}
