//! I/O helpers for autofix commands.

pub mod attempt_log;
pub mod config;
pub mod locate;
pub mod oracle;
pub mod process;
pub mod prompt;
pub mod snapshot;
pub mod test_runner;
