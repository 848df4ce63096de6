//! Deterministic, pure logic shared by the autofix workflows.
//!
//! Core modules must be free of I/O side effects. They operate on strings and
//! in-memory values and return deterministic outputs suitable for tests.

pub mod diagnose;
pub mod fences;
pub mod types;
