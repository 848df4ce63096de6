//! Test-only doubles for the oracle and the test runner, plus a scratch project.

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::core::types::TestOutcome;
use crate::fix_loop::FixSettings;
use crate::io::oracle::{Oracle, OracleError, OracleRequest};
use crate::io::test_runner::TestRunner;

/// Oracle that answers from a queue and records every request.
///
/// An exhausted queue answers with a permanent error.
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<String, OracleError>>>,
    requests: Mutex<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<Result<String, OracleError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }

    pub fn prompts(&self) -> Vec<OracleRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl Oracle for ScriptedOracle {
    fn generate(&self, request: &OracleRequest) -> Result<String, OracleError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| Err(OracleError::permanent("no scripted reply left")))
    }
}

/// One scripted test-suite invocation.
#[derive(Debug, Clone)]
pub enum ScriptedRun {
    Pass,
    /// Failing run with the given stderr.
    Fail(String),
    /// Failing run with empty stderr and the given stdout.
    FailStdout(String),
    /// The runner itself could not run.
    Error(String),
}

/// Test runner that replays a queue of [`ScriptedRun`]s.
pub struct ScriptedTestRunner {
    runs: Mutex<VecDeque<ScriptedRun>>,
    calls: Mutex<usize>,
}

impl ScriptedTestRunner {
    pub fn new(runs: Vec<ScriptedRun>) -> Self {
        Self {
            runs: Mutex::new(runs.into()),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().expect("calls lock")
    }
}

impl TestRunner for ScriptedTestRunner {
    fn run(&self) -> Result<TestOutcome> {
        *self.calls.lock().expect("calls lock") += 1;
        let next = self
            .runs
            .lock()
            .expect("runs lock")
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted test run left"))?;
        match next {
            ScriptedRun::Pass => Ok(outcome(true, "1 passed", "")),
            ScriptedRun::Fail(stderr) => Ok(outcome(false, "", &stderr)),
            ScriptedRun::FailStdout(stdout) => Ok(outcome(false, &stdout, "")),
            ScriptedRun::Error(message) => Err(anyhow!(message)),
        }
    }
}

fn outcome(passed: bool, stdout: &str, stderr: &str) -> TestOutcome {
    TestOutcome {
        passed,
        exit_code: Some(if passed { 0 } else { 1 }),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

/// Scratch layout: `<tmp>/project` (target) next to `<tmp>/project_backup`.
pub struct ProjectFixture {
    temp: TempDir,
    target: PathBuf,
    backup: PathBuf,
}

impl ProjectFixture {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let target = temp.path().join("project");
        let backup = temp.path().join("project_backup");
        fs::create_dir_all(&target)?;
        Ok(Self {
            temp,
            target,
            backup,
        })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn backup(&self) -> &Path {
        &self.backup
    }

    pub fn settings(&self, max_attempts: u32) -> FixSettings {
        FixSettings {
            target_dir: self.target.clone(),
            backup_dir: self.backup.clone(),
            max_attempts,
            attempts_dir: None,
        }
    }

    /// Write `contents` to `rel` under the target, creating parent dirs.
    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.target.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, contents).expect("write project file");
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.target.join(rel)).expect("read project file")
    }

    /// Every file under the target, keyed by relative path.
    pub fn target_contents(&self) -> BTreeMap<String, Vec<u8>> {
        tree_contents(&self.target)
    }

    /// Every file under the backup, keyed by relative path.
    pub fn backup_contents(&self) -> BTreeMap<String, Vec<u8>> {
        tree_contents(&self.backup)
    }
}

fn tree_contents(root: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let rel = entry
                .path()
                .strip_prefix(root)
                .expect("entry under root")
                .display()
                .to_string();
            let bytes = fs::read(entry.path()).expect("read tree file");
            (rel, bytes)
        })
        .collect()
}
