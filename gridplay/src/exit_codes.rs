//! Stable exit codes for gridplay CLI commands.

/// Every game finished by winning or exhausting its action budget.
pub const OK: i32 = 0;
/// A session failed, or config/CLI input was invalid.
pub const FAILED: i32 = 1;
/// The operator interrupted the run (Ctrl-C).
pub const INTERRUPTED: i32 = 130;
