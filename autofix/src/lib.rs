//! Oracle-driven code repair for Python projects.
//!
//! The crate wraps a hosted code-generation model ("the oracle") behind three
//! workflows:
//!
//! - **[`fix_loop`]**: back up a project, run its tests, ask the oracle for a
//!   replacement of the failing file, apply it and retry a bounded number of
//!   times. Every non-success path restores the backup.
//! - **[`generate`]**: render a file from a prompt file, retrying quota errors.
//! - **[`correct`]**: rewrite a snippet of user code against a system prompt.
//!
//! As in the rest of the workspace the code is split into:
//!
//! - **[`core`]**: Pure, deterministic logic (diagnosis, fence handling).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, subprocesses, HTTP).
//!   Each collaborator sits behind a trait so tests can script it.

pub mod core;
pub mod correct;
pub mod exit_codes;
pub mod fix_loop;
pub mod generate;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
