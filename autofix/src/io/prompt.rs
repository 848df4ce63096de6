//! Prompt rendering for oracle requests.

use anyhow::Result;
use minijinja::{Environment, context};

const FIX_TEMPLATE: &str = include_str!("prompts/fix.md");

/// System instruction used by the corrector when the caller supplies none.
pub const DEFAULT_CORRECTION_PROMPT: &str = include_str!("prompts/correct_system.md");

/// Inputs for the fix-loop prompt.
#[derive(Debug, Clone)]
pub struct FixPromptInputs<'a> {
    /// Raw diagnostic text from the failing test run.
    pub diagnostic: &'a str,
    /// Path of the diagnosed file, as shown to the oracle.
    pub path: &'a str,
    /// Full current contents of the diagnosed file.
    pub source: &'a str,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("fix", FIX_TEMPLATE)
            .expect("fix template should be valid");
        Self { env }
    }

    fn render_fix(&self, input: &FixPromptInputs<'_>) -> Result<String> {
        let template = self.env.get_template("fix")?;
        let rendered = template.render(context! {
            diagnostic => input.diagnostic.trim_end(),
            path => input.path,
            source => input.source.trim_end_matches('\n'),
        })?;
        Ok(rendered)
    }
}

/// Render the single prompt sent for one fix attempt.
pub fn render_fix_prompt(input: &FixPromptInputs<'_>) -> Result<String> {
    PromptEngine::new().render_fix(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_prompt_contains_every_input() {
        let prompt = render_fix_prompt(&FixPromptInputs {
            diagnostic: "./calc.py:3: TypeError\n",
            path: "project/calc.py",
            source: "def add(a, b):\n    return a - b\n",
        })
        .expect("render");

        assert!(prompt.starts_with("You are an expert Python developer."));
        assert!(prompt.contains("./calc.py:3: TypeError"));
        assert!(prompt.contains("```python\ndef add(a, b):\n    return a - b\n```"));
        assert!(prompt.contains("Reply with only the complete, corrected source code for project/calc.py."));
    }

    #[test]
    fn fix_prompt_does_not_escape_source() {
        let prompt = render_fix_prompt(&FixPromptInputs {
            diagnostic: "E",
            path: "a.py",
            source: "if a < b and c > d: print('&')",
        })
        .expect("render");
        assert!(prompt.contains("if a < b and c > d: print('&')"));
    }

    #[test]
    fn default_correction_prompt_demands_raw_code() {
        assert!(DEFAULT_CORRECTION_PROMPT.contains("ONLY the raw, corrected Python code"));
    }
}
