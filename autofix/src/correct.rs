//! Prompt-driven rewrite of a code snippet (`autofix correct`, `POST /api/correct`).

use anyhow::{Result, bail};
use tracing::{info, instrument};

use crate::core::fences::sanitize_reply;
use crate::io::oracle::{Oracle, OracleError, OracleRequest};
use crate::io::prompt::DEFAULT_CORRECTION_PROMPT;

/// Output-token cap for corrections.
pub const CORRECTION_MAX_OUTPUT_TOKENS: u32 = 4096;

/// Why a correction produced no code.
#[derive(Debug)]
pub enum CorrectError {
    /// The submitted code was blank.
    EmptyInput,
    Oracle(OracleError),
    /// The oracle answered, but nothing was left after sanitizing.
    EmptyReply,
}

impl std::fmt::Display for CorrectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyInput => f.write_str("no code to correct"),
            Self::Oracle(err) => write!(f, "{err}"),
            Self::EmptyReply => f.write_str("the oracle returned an empty response"),
        }
    }
}

impl std::error::Error for CorrectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Oracle(err) => Some(err),
            _ => None,
        }
    }
}

/// Rewrite `code` following `system_prompt` (or the default reviewer prompt).
#[instrument(skip_all, fields(code_bytes = code.len()))]
pub fn correct_code<O: Oracle + ?Sized>(
    oracle: &O,
    code: &str,
    system_prompt: Option<&str>,
) -> Result<String, CorrectError> {
    if code.trim().is_empty() {
        return Err(CorrectError::EmptyInput);
    }
    let system = system_prompt
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_CORRECTION_PROMPT.trim());

    let request = OracleRequest {
        system: Some(system.to_string()),
        prompt: code.to_string(),
        max_output_tokens: Some(CORRECTION_MAX_OUTPUT_TOKENS),
    };
    let reply = oracle.generate(&request).map_err(CorrectError::Oracle)?;
    let corrected = sanitize_reply(&reply);
    if corrected.is_empty() {
        return Err(CorrectError::EmptyReply);
    }
    info!(corrected_bytes = corrected.len(), "code corrected");
    Ok(corrected)
}

/// [`correct_code`] with the error widened to `anyhow`, for the CLI.
pub fn correct_code_any<O: Oracle + ?Sized>(
    oracle: &O,
    code: &str,
    system_prompt: Option<&str>,
) -> Result<String> {
    match correct_code(oracle, code, system_prompt) {
        Ok(corrected) => Ok(corrected),
        Err(CorrectError::EmptyInput) => bail!("input file is empty; nothing to correct"),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedOracle;

    #[test]
    fn sends_code_with_system_prompt() {
        let oracle = ScriptedOracle::new(vec![Ok("```python\ndef f(a, b):\n    return a + b\n```".to_string())]);
        let corrected =
            correct_code(&oracle, "def f(a, b)\n    return a - b", Some("Fix it.")).expect("correct");

        assert_eq!(corrected, "def f(a, b):\n    return a + b");
        let request = &oracle.prompts()[0];
        assert_eq!(request.system.as_deref(), Some("Fix it."));
        assert_eq!(request.prompt, "def f(a, b)\n    return a - b");
        assert_eq!(request.max_output_tokens, Some(CORRECTION_MAX_OUTPUT_TOKENS));
    }

    #[test]
    fn blank_prompt_uses_default_system_prompt() {
        let oracle = ScriptedOracle::new(vec![Ok("x = 1".to_string())]);
        correct_code(&oracle, "x = ", Some("  ")).expect("correct");
        let system = oracle.prompts()[0].system.clone().expect("system");
        assert!(system.starts_with("You are an expert Python developer and code reviewer."));
    }

    #[test]
    fn blank_code_is_rejected_without_calling_oracle() {
        let oracle = ScriptedOracle::new(vec![]);
        let err = correct_code(&oracle, " \n", None).unwrap_err();
        assert!(matches!(err, CorrectError::EmptyInput));
        assert_eq!(oracle.calls(), 0);
    }

    #[test]
    fn empty_reply_is_an_error() {
        let oracle = ScriptedOracle::new(vec![Ok("```\n```".to_string())]);
        let err = correct_code(&oracle, "x = 1", None).unwrap_err();
        assert!(matches!(err, CorrectError::EmptyReply));
    }

    #[test]
    fn oracle_error_is_preserved() {
        let oracle = ScriptedOracle::new(vec![Err(OracleError::permanent("HTTP 403: denied"))]);
        let err = correct_code(&oracle, "x = 1", None).unwrap_err();
        assert!(err.to_string().contains("HTTP 403"));
    }
}
