//! `autofix`: oracle-driven repair for Python projects.
//!
//! - `autofix fix` runs the backup / test / fix / retry loop on the target
//!   project and restores it when the tests cannot be made to pass.
//! - `autofix generate` writes a file from a prompt file.
//! - `autofix correct <file>` rewrites one file against a correction prompt.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use autofix::core::types::FixStop;
use autofix::correct::correct_code_any;
use autofix::exit_codes;
use autofix::fix_loop::{FixSession, FixSettings};
use autofix::generate::{GenerateRequest, run_generate};
use autofix::io::config::{AutofixConfig, DEFAULT_CONFIG_PATH, load_config, write_config};
use autofix::io::oracle::GeminiOracle;
use autofix::io::test_runner::CommandTestRunner;
use autofix::logging;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "autofix",
    version,
    about = "Oracle-driven repair for Python projects"
)]
struct Cli {
    /// Path to the TOML config file (defaults apply when it is missing).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a config file with default values.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Run tests, ask the oracle to fix the failing file, retry; restore on failure.
    Fix {
        /// Project directory to repair (overrides `target_dir`).
        #[arg(long)]
        target: Option<PathBuf>,
        /// Backup location (overrides `backup_dir`).
        #[arg(long)]
        backup: Option<PathBuf>,
        /// Maximum test runs (overrides `max_attempts`).
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Generate a file from a prompt file.
    Generate {
        /// Prompt file (overrides `generate.prompt_path`).
        #[arg(long)]
        prompt: Option<PathBuf>,
        /// Output directory (overrides `generate.output_dir`).
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Rewrite one file following a correction prompt.
    Correct {
        /// File whose contents are sent for correction.
        file: PathBuf,
        /// System prompt; defaults to an expert-reviewer instruction.
        #[arg(long)]
        prompt: Option<String>,
        /// Overwrite the file instead of printing the result.
        #[arg(long)]
        write: bool,
    },
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Fix {
            target,
            backup,
            max_attempts,
        } => {
            let mut cfg = prepare(&cli.config)?;
            if let Some(target) = target {
                cfg.target_dir = target;
            }
            if let Some(backup) = backup {
                cfg.backup_dir = backup;
            }
            if let Some(max_attempts) = max_attempts {
                cfg.max_attempts = max_attempts;
            }
            cfg.validate()?;
            cmd_fix(&cfg)
        }
        Command::Generate { prompt, output_dir } => {
            let mut cfg = prepare(&cli.config)?;
            if let Some(prompt) = prompt {
                cfg.generate.prompt_path = prompt;
            }
            if let Some(output_dir) = output_dir {
                cfg.generate.output_dir = output_dir;
            }
            cmd_generate(&cfg)
        }
        Command::Correct {
            file,
            prompt,
            write,
        } => {
            let cfg = prepare(&cli.config)?;
            cmd_correct(&cfg, &file, prompt.as_deref(), write)
        }
    }
}

/// Load config and install logging (to the configured log file, if any).
fn prepare(config_path: &Path) -> Result<AutofixConfig> {
    let cfg = load_config(config_path)?;
    logging::init("info", cfg.log_file.as_deref())?;
    Ok(cfg)
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        println!("init: {} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &AutofixConfig::default())?;
    println!("init: wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_fix(cfg: &AutofixConfig) -> Result<i32> {
    let oracle = GeminiOracle::from_config(&cfg.oracle)?;
    let tests = CommandTestRunner::from_config(&cfg.tests)?;
    let outcome = FixSession::new(&oracle, &tests, FixSettings::from_config(cfg)).run()?;

    match outcome.stop {
        FixStop::TestsPassed => {
            println!(
                "fix: run={} attempts={} fixed={} outcome=passed",
                outcome.run_id,
                outcome.attempts,
                outcome.fixed_files.len()
            );
            Ok(exit_codes::OK)
        }
        FixStop::Restored { reason } => {
            println!(
                "fix: run={} attempts={} outcome=restored reason={}",
                outcome.run_id, outcome.attempts, reason
            );
            Ok(exit_codes::RESTORED)
        }
    }
}

fn cmd_generate(cfg: &AutofixConfig) -> Result<i32> {
    let oracle = GeminiOracle::from_config(&cfg.oracle)?;
    let path = run_generate(&oracle, &GenerateRequest::from_config(&cfg.generate))?;
    println!("generate: wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_correct(cfg: &AutofixConfig, file: &Path, prompt: Option<&str>, write: bool) -> Result<i32> {
    let code = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let oracle = GeminiOracle::from_config(&cfg.oracle)?;
    let corrected = correct_code_any(&oracle, &code, prompt)?;
    if write {
        fs::write(file, &corrected).with_context(|| format!("write {}", file.display()))?;
        println!("correct: wrote {}", file.display());
    } else {
        println!("{corrected}");
    }
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fix_with_overrides() {
        let cli = Cli::parse_from([
            "autofix",
            "fix",
            "--target",
            "proj",
            "--max-attempts",
            "5",
        ]);
        match cli.command {
            Command::Fix {
                target,
                backup,
                max_attempts,
            } => {
                assert_eq!(target, Some(PathBuf::from("proj")));
                assert_eq!(backup, None);
                assert_eq!(max_attempts, Some(5));
            }
            _ => panic!("expected fix"),
        }
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn parse_init_force_with_config() {
        let cli = Cli::parse_from(["autofix", "--config", "custom.toml", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
    }

    #[test]
    fn parse_correct() {
        let cli = Cli::parse_from(["autofix", "correct", "bug.py", "--prompt", "Fix it", "--write"]);
        match cli.command {
            Command::Correct {
                file,
                prompt,
                write,
            } => {
                assert_eq!(file, PathBuf::from("bug.py"));
                assert_eq!(prompt.as_deref(), Some("Fix it"));
                assert!(write);
            }
            _ => panic!("expected correct"),
        }
    }
}
