//! Stable exit codes for `forge` commands.

/// The component was approved (or the command has no verdict).
pub const OK: i32 = 0;
/// A stage failed, or config, policy or input was invalid.
pub const INVALID: i32 = 1;
/// The session finished without approval after using its retry budget.
pub const REJECTED: i32 = 2;
