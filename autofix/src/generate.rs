//! One-shot file generation for `autofix generate`.
//!
//! Reads a prompt file, asks the oracle for code, and saves the first fenced
//! python block of the reply. Quota and other transient oracle errors are
//! retried after a cooldown; permanent errors end the run immediately.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{error, info, instrument, warn};

use crate::core::fences::extract_python_block;
use crate::io::config::GenerateConfig;
use crate::io::oracle::{Oracle, OracleRequest};

/// Inputs for one generation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub prompt_path: PathBuf,
    pub output_dir: PathBuf,
    pub output_file: String,
    pub max_retries: u32,
    pub cooldown: Duration,
}

impl GenerateRequest {
    pub fn from_config(cfg: &GenerateConfig) -> Self {
        Self {
            prompt_path: cfg.prompt_path.clone(),
            output_dir: cfg.output_dir.clone(),
            output_file: cfg.output_file.clone(),
            max_retries: cfg.max_retries,
            cooldown: Duration::from_secs(cfg.cooldown_secs),
        }
    }
}

/// Generate and save the file; returns the written path.
#[instrument(skip_all, fields(prompt = %request.prompt_path.display()))]
pub fn run_generate<O: Oracle + ?Sized>(oracle: &O, request: &GenerateRequest) -> Result<PathBuf> {
    let prompt = load_prompt(&request.prompt_path)?;
    let code = generate_code(oracle, &prompt, request.max_retries, request.cooldown)?;
    save_generated(&request.output_dir, &request.output_file, &code)
}

/// Read a prompt file, rejecting missing or blank files.
pub fn load_prompt(path: &Path) -> Result<String> {
    if !path.exists() {
        bail!("prompt file {} not found", path.display());
    }
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let text = text.trim();
    if text.is_empty() {
        bail!("prompt file {} is empty", path.display());
    }
    Ok(text.to_string())
}

/// Call the oracle until it returns a fenced python block.
///
/// Makes at most `max_retries` calls. Transient errors sleep for `cooldown`
/// before the next call; replies without a non-empty python block are retried
/// at once.
pub fn generate_code<O: Oracle + ?Sized>(
    oracle: &O,
    prompt: &str,
    max_retries: u32,
    cooldown: Duration,
) -> Result<String> {
    let request = OracleRequest::new(prompt);
    for attempt in 1..=max_retries {
        match oracle.generate(&request) {
            Ok(reply) => match extract_python_block(&reply).filter(|code| !code.is_empty()) {
                Some(code) => {
                    info!(attempt, bytes = code.len(), "code generated");
                    return Ok(code);
                }
                None => {
                    error!(attempt, "could not find a non-empty ```python``` block in the reply");
                }
            },
            Err(err) if err.is_transient() => {
                warn!(
                    attempt,
                    cooldown_secs = cooldown.as_secs(),
                    err = %err,
                    "transient oracle error, retrying after cooldown"
                );
                thread::sleep(cooldown);
            }
            Err(err) => return Err(err).context("generate code"),
        }
    }
    error!(max_retries, "failed to generate code");
    bail!("failed to generate code after {max_retries} attempts")
}

/// Write `code` to `<dir>/<file>`, creating `dir` if needed.
pub fn save_generated(dir: &Path, file: &str, code: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(file);
    fs::write(&path, code).with_context(|| format!("write {}", path.display()))?;
    info!(path = %path.display(), "generated file saved");
    Ok(path)
}
