//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Input error - malformed reference, port, env var or manifest
pub const INPUT_ERROR: i32 = 2;

/// Configuration error - unreadable or invalid config file
pub const CONFIG_ERROR: i32 = 3;

/// Cluster error - API failure, missing resource, terminal object state
pub const CLUSTER_ERROR: i32 = 4;

/// Timeout - a wait deadline elapsed
pub const TIMEOUT: i32 = 5;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 6;
