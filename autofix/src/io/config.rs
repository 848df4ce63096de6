//! Autofix configuration stored in `autofix.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::process::ProcessLimits;

pub const DEFAULT_CONFIG_PATH: &str = "autofix.toml";

/// Autofix configuration (TOML).
///
/// Meant to be edited by humans. Missing fields take the defaults below, which
/// mirror the layout the agent was first written against: a `target_project`
/// next to a `test_suite`, backed up into `target_project_backup`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutofixConfig {
    /// Project tree the fix loop repairs.
    pub target_dir: PathBuf,

    /// Where the snapshot of `target_dir` is kept. Replaced on every run.
    pub backup_dir: PathBuf,

    /// Upper bound on test-runner invocations per fix run.
    pub max_attempts: u32,

    /// Optional plain-text log file, in addition to stderr.
    pub log_file: Option<PathBuf>,

    /// Optional directory for per-attempt records.
    pub attempts_dir: Option<PathBuf>,

    pub tests: TestsConfig,
    pub oracle: OracleConfig,
    pub generate: GenerateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestsConfig {
    /// Test command argv.
    pub command: Vec<String>,

    /// Directory the command runs in; the current directory when unset.
    pub workdir: Option<PathBuf>,

    /// Kill the test run after this many seconds.
    pub timeout_secs: u64,

    /// Keep at most this many bytes of each output stream.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    /// Base URL of the Generative Language REST API.
    pub endpoint: String,

    pub model: String,

    /// Name of the environment variable holding the API key.
    pub api_key_env: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Output-token cap for fix and generate requests. Replies cut off at the
    /// cap are rejected.
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerateConfig {
    pub prompt_path: PathBuf,
    pub output_dir: PathBuf,
    pub output_file: String,

    /// Oracle calls before giving up.
    pub max_retries: u32,

    /// Sleep between calls after a transient (quota) error.
    pub cooldown_secs: u64,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "python3".to_string(),
                "-m".to_string(),
                "pytest".to_string(),
                "../test_suite/".to_string(),
            ],
            workdir: None,
            timeout_secs: 10 * 60,
            output_limit_bytes: 200_000,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            timeout_secs: 120,
            max_output_tokens: 8192,
        }
    }
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            prompt_path: PathBuf::from("main.prompt"),
            output_dir: PathBuf::from("generated_agent"),
            output_file: "agent.py".to_string(),
            max_retries: 3,
            cooldown_secs: 31,
        }
    }
}

impl Default for AutofixConfig {
    fn default() -> Self {
        Self {
            target_dir: PathBuf::from("../target_project/"),
            backup_dir: PathBuf::from("../target_project_backup/"),
            max_attempts: 3,
            log_file: None,
            attempts_dir: None,
            tests: TestsConfig::default(),
            oracle: OracleConfig::default(),
            generate: GenerateConfig::default(),
        }
    }
}

impl TestsConfig {
    pub fn limits(&self) -> ProcessLimits {
        ProcessLimits {
            timeout: Duration::from_secs(self.timeout_secs),
            output_limit_bytes: self.output_limit_bytes,
        }
    }
}

impl AutofixConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.target_dir.as_os_str().is_empty() {
            return Err(anyhow!("target_dir must be set"));
        }
        if self.backup_dir.as_os_str().is_empty() {
            return Err(anyhow!("backup_dir must be set"));
        }
        if self.backup_dir == self.target_dir {
            return Err(anyhow!("backup_dir must differ from target_dir"));
        }
        if self.tests.command.is_empty() || self.tests.command[0].trim().is_empty() {
            return Err(anyhow!("tests.command must be a non-empty array"));
        }
        if self.tests.timeout_secs == 0 {
            return Err(anyhow!("tests.timeout_secs must be > 0"));
        }
        if self.tests.output_limit_bytes == 0 {
            return Err(anyhow!("tests.output_limit_bytes must be > 0"));
        }
        if self.oracle.model.trim().is_empty() {
            return Err(anyhow!("oracle.model must be set"));
        }
        if self.oracle.api_key_env.trim().is_empty() {
            return Err(anyhow!("oracle.api_key_env must be set"));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(anyhow!("oracle.timeout_secs must be > 0"));
        }
        if self.generate.max_retries == 0 {
            return Err(anyhow!("generate.max_retries must be > 0"));
        }
        if self.generate.output_file.trim().is_empty() {
            return Err(anyhow!("generate.output_file must be set"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AutofixConfig::default()`.
pub fn load_config(path: &Path) -> Result<AutofixConfig> {
    if !path.exists() {
        let cfg = AutofixConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AutofixConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AutofixConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
