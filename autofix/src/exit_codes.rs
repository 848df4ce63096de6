//! Stable exit codes for autofix CLI commands.

/// Command succeeded (for `autofix fix`: the test suite passes).
pub const OK: i32 = 0;
/// Command failed due to invalid config, a fatal I/O error, or an oracle error.
pub const INVALID: i32 = 1;
/// `autofix fix` gave up and restored the project from its backup.
pub const RESTORED: i32 = 2;
