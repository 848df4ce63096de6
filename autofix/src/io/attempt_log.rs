//! Per-attempt records under `<attempts_dir>/<run_id>/<attempt>/`.
//!
//! These are debugging artifacts for unattended runs: what the test runner
//! said, which file was blamed, and what the oracle answered.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::FailureKind;

#[derive(Debug, Clone, Default, Serialize)]
pub struct AttemptMeta {
    pub run_id: String,
    pub attempt: u32,
    pub tests_passed: Option<bool>,
    pub exit_code: Option<i32>,
    /// Diagnosed file, once resolved.
    pub file: Option<String>,
    /// Set when this attempt ended the run with a restore.
    pub failure: Option<FailureKind>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AttemptPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub diagnostic_path: PathBuf,
    pub reply_path: PathBuf,
}

impl AttemptPaths {
    pub fn new(attempts_dir: &Path, run_id: &str, attempt: u32) -> Self {
        let dir = attempts_dir.join(run_id).join(attempt.to_string());
        Self {
            meta_path: dir.join("meta.json"),
            diagnostic_path: dir.join("diagnostic.log"),
            reply_path: dir.join("reply.txt"),
            dir,
        }
    }
}

pub struct AttemptRecord<'a> {
    pub meta: &'a AttemptMeta,
    pub diagnostic: Option<&'a str>,
    pub reply: Option<&'a str>,
}

pub fn write_attempt(attempts_dir: &Path, record: &AttemptRecord<'_>) -> Result<AttemptPaths> {
    let paths = AttemptPaths::new(attempts_dir, &record.meta.run_id, record.meta.attempt);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create attempt dir {}", paths.dir.display()))?;

    let mut meta = serde_json::to_string_pretty(record.meta).context("serialize attempt meta")?;
    meta.push('\n');
    write_text(&paths.meta_path, &meta)?;
    if let Some(diagnostic) = record.diagnostic {
        write_text(&paths.diagnostic_path, diagnostic)?;
    }
    if let Some(reply) = record.reply {
        write_text(&paths.reply_path, reply)?;
    }
    Ok(paths)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_paths_are_stable() {
        let paths = AttemptPaths::new(Path::new("logs"), "run-1", 2);
        assert!(paths.dir.ends_with("logs/run-1/2"));
        assert!(paths.meta_path.ends_with("meta.json"));
        assert!(paths.diagnostic_path.ends_with("diagnostic.log"));
        assert!(paths.reply_path.ends_with("reply.txt"));
    }

    #[test]
    fn writes_only_present_artifacts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let meta = AttemptMeta {
            run_id: "run-1".to_string(),
            attempt: 1,
            tests_passed: Some(false),
            failure: Some(FailureKind::Diagnosis),
            ..AttemptMeta::default()
        };

        let paths = write_attempt(
            temp.path(),
            &AttemptRecord {
                meta: &meta,
                diagnostic: Some("boom"),
                reply: None,
            },
        )
        .expect("write");

        assert_eq!(fs::read_to_string(&paths.diagnostic_path).expect("read"), "boom");
        assert!(!paths.reply_path.exists());
        let meta_json = fs::read_to_string(&paths.meta_path).expect("read meta");
        assert!(meta_json.contains("\"failure\": \"diagnosis\""));
    }
}
