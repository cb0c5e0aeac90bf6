//! Process exit codes

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// Generic failure
pub const ERROR: i32 = 1;

/// Validation or lint error
pub const VALIDATION_ERROR: i32 = 2;

/// Operation cancelled by the operator
pub const CANCELLED: i32 = 3;

/// Integrity or signature failure
pub const INTEGRITY_ERROR: i32 = 4;
