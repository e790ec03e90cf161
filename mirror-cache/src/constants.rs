//! Constants for the mirror cache
//!
//! Defaults and environment variable names used by [`crate::RefreshConfig`].

// ============================================================================
// REFRESH
// ============================================================================

/// Default refresh interval in milliseconds (1 second)
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 1000;

/// Refresh interval used by `RefreshConfig::development()`
pub const DEVELOPMENT_REFRESH_INTERVAL_MS: u64 = 100;

/// Whether a configuration error stops the refresh loop by default
pub const DEFAULT_STOP_ON_CONFIG_ERROR: bool = true;

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// Refresh interval override, in milliseconds
pub const ENV_REFRESH_INTERVAL_MS: &str = "MIRROR_REFRESH_INTERVAL_MS";

/// Set to `false` to keep ticking after a configuration error
pub const ENV_STOP_ON_CONFIG_ERROR: &str = "MIRROR_STOP_ON_CONFIG_ERROR";
