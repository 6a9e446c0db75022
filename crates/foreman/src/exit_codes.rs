//! Exit codes for the CLI

/// Validation error
pub const VALIDATION_ERROR: i32 = 5;

/// Downloaded blob failed digest verification
pub const INTEGRITY_ERROR: i32 = 6;
